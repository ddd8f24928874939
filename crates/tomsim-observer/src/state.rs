//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the in-memory snapshot that the REST endpoints
//! serve, the event bus that feeds `WebSocket` clients, and the scheduler
//! that operator commands go to. Reads never take the simulation lock:
//! the engine refreshes the snapshot after every tick, and command
//! handlers refresh it after the command has completed.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tomsim_core::{EventBus, Scheduler, Simulation, SimulationEvent};
use tomsim_types::{AgentView, PopulationCounts, RunState, StatusView};

/// Number of population history rows kept in the snapshot.
pub const RECENT_HISTORY: usize = 100;

/// In-memory snapshot of the simulation served by REST endpoints.
#[derive(Debug, Clone)]
pub struct SimulationSnapshot {
    /// Run status at capture time.
    pub status: StatusView,
    /// Every live agent, sorted by order then id.
    pub agents: Vec<AgentView>,
    /// The most recent population history rows, oldest first.
    pub history: Vec<PopulationCounts>,
}

impl SimulationSnapshot {
    /// Capture the current state of `simulation`.
    pub fn capture(simulation: &Simulation, run_state: RunState) -> Self {
        Self {
            status: simulation.status(run_state),
            agents: simulation.agent_views(None),
            history: simulation.stats().recent_history(RECENT_HISTORY).to_vec(),
        }
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// The current simulation snapshot.
    pub snapshot: Arc<RwLock<SimulationSnapshot>>,
    /// Scheduler receiving operator commands (absent in read-only mode).
    pub scheduler: Option<Arc<Scheduler>>,
    events: EventBus,
}

impl AppState {
    /// Read-only state over a fixed snapshot and its own event bus.
    pub fn new(snapshot: SimulationSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            scheduler: None,
            events: EventBus::new(),
        }
    }

    /// State attached to a running scheduler. The snapshot is captured
    /// immediately and events come from the scheduler's bus.
    pub async fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        let snapshot = {
            let simulation = scheduler.simulation().lock().await;
            SimulationSnapshot::capture(&simulation, scheduler.operator().run_state())
        };
        Self::attached(Arc::new(RwLock::new(snapshot)), scheduler)
    }

    /// State attached to a running scheduler over a snapshot that is shared
    /// with a tick callback.
    pub fn attached(snapshot: Arc<RwLock<SimulationSnapshot>>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            snapshot,
            events: scheduler.events().clone(),
            scheduler: Some(scheduler),
        }
    }

    /// The event bus clients stream from.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to simulation events.
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.events.subscribe()
    }

    /// Current run state: live from the operator when a scheduler is
    /// attached, otherwise as captured.
    pub async fn run_state(&self) -> RunState {
        match &self.scheduler {
            Some(scheduler) => scheduler.operator().run_state(),
            None => self.snapshot.read().await.status.run_state,
        }
    }

    /// Recapture the snapshot from the scheduler's simulation. Does nothing
    /// in read-only mode.
    pub async fn refresh(&self) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        let fresh = {
            let simulation = scheduler.simulation().lock().await;
            SimulationSnapshot::capture(&simulation, scheduler.operator().run_state())
        };
        *self.snapshot.write().await = fresh;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tomsim_core::SimulationConfig;
    use tomsim_types::ExperimentPhase;

    use super::*;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::parse_without_env("").unwrap();
        config.experiment.initial_agents = 6;
        config.experiment.seed = Some(3);
        config
    }

    #[test]
    fn capture_copies_the_population() {
        let simulation = Simulation::new(config());
        let snapshot = SimulationSnapshot::capture(&simulation, RunState::Paused);
        assert_eq!(snapshot.agents.len(), 6);
        assert_eq!(snapshot.status.counts.tom0, 6);
        assert_eq!(snapshot.status.phase, ExperimentPhase::NotInitialized);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test]
    async fn refresh_follows_the_scheduler() {
        let scheduler = Arc::new(Scheduler::spawn(
            config(),
            Box::new(tomsim_core::runner::NoOpCallback),
        ));
        let state = AppState::with_scheduler(Arc::clone(&scheduler)).await;
        assert_eq!(state.run_state().await, RunState::Paused);

        scheduler.begin_experiment().await;
        scheduler.pause();
        state.refresh().await;
        assert_eq!(
            state.snapshot.read().await.status.phase,
            ExperimentPhase::Initializing
        );
        scheduler.shutdown().await.unwrap();
    }
}
