//! Tick callback that keeps the Observer snapshot current.
//!
//! The callback runs under the simulation lock, so it never waits: it
//! takes the snapshot write lock with `try_write` and skips the update if
//! a REST handler is reading. Refreshes are throttled to one per
//! [`REFRESH_INTERVAL`], except that a phase change always refreshes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tomsim_core::runner::TickCallback;
use tomsim_core::{Simulation, TickSummary};
use tomsim_observer::SimulationSnapshot;
use tomsim_types::RunState;
use tracing::debug;

/// Minimum wall-clock time between snapshot refreshes.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Callback that bridges the tick cycle to the Observer API.
pub struct ObserverCallback {
    snapshot: Arc<RwLock<SimulationSnapshot>>,
    last_refresh: Option<Instant>,
}

impl ObserverCallback {
    /// Create a callback writing into `snapshot`.
    pub const fn new(snapshot: Arc<RwLock<SimulationSnapshot>>) -> Self {
        Self {
            snapshot,
            last_refresh: None,
        }
    }

    fn due(&self, summary: &TickSummary, now: Instant) -> bool {
        summary.phase_change.is_some()
            || self
                .last_refresh
                .is_none_or(|last| now.saturating_duration_since(last) >= REFRESH_INTERVAL)
    }
}

impl TickCallback for ObserverCallback {
    fn on_tick(&mut self, summary: &TickSummary, simulation: &Simulation) {
        let now = Instant::now();
        if !self.due(summary, now) {
            return;
        }
        // Ticks only run while the loop is running; handlers read the live
        // run state from the operator anyway.
        if let Ok(mut snapshot) = self.snapshot.try_write() {
            *snapshot = SimulationSnapshot::capture(simulation, RunState::Running);
            self.last_refresh = Some(now);
        } else {
            debug!(tick = summary.tick, "snapshot busy, refresh skipped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tomsim_core::SimulationConfig;

    use super::*;

    fn simulation() -> Simulation {
        let mut config = SimulationConfig::parse_without_env("").unwrap();
        config.experiment.initial_agents = 4;
        config.experiment.seed = Some(9);
        Simulation::new(config)
    }

    #[test]
    fn refreshes_then_throttles() {
        let mut simulation = simulation();
        let snapshot = Arc::new(RwLock::new(SimulationSnapshot::capture(
            &simulation,
            RunState::Paused,
        )));
        let mut callback = ObserverCallback::new(Arc::clone(&snapshot));

        let first = simulation.run_tick().unwrap();
        callback.on_tick(&first, &simulation);
        assert_eq!(snapshot.try_read().unwrap().status.tick, 1);

        let second = simulation.run_tick().unwrap();
        callback.on_tick(&second, &simulation);
        assert_eq!(snapshot.try_read().unwrap().status.tick, 1);
    }

    #[test]
    fn busy_snapshot_is_skipped() {
        let mut simulation = simulation();
        let snapshot = Arc::new(RwLock::new(SimulationSnapshot::capture(
            &simulation,
            RunState::Paused,
        )));
        let mut callback = ObserverCallback::new(Arc::clone(&snapshot));
        let summary = simulation.run_tick().unwrap();

        let reader = snapshot.try_read().unwrap();
        callback.on_tick(&summary, &simulation);
        assert_eq!(reader.status.tick, 0);
        drop(reader);

        callback.on_tick(&summary, &simulation);
        assert_eq!(snapshot.try_read().unwrap().status.tick, 1);
    }
}
