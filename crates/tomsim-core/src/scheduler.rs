//! The scheduler: one long-lived loop task plus the controller commands.
//!
//! The [`Scheduler`] owns the shared simulation, the operator state, and the
//! event bus. Commands never touch the simulation while a tick is running:
//! they either flip operator flags that the loop observes at the next tick
//! boundary, or they take the simulation lock between ticks.
//!
//! `new_run` stops the loop and awaits its task before the simulation is
//! rebuilt, so no tick can observe a half-reset state.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tomsim_types::{ExperimentPhase, RunState, StatusView};
use tracing::{error, info};

use crate::config::SimulationConfig;
use crate::events::{EventBus, SimulationEvent};
use crate::operator::{OperatorState, OperatorStatus};
use crate::runner::{self, RunnerError, SimulationResult, TickCallback};
use crate::tick::Simulation;

/// What a finished loop task hands back: its callback, for reuse by the
/// next loop, and how it ended.
type LoopOutput = (Box<dyn TickCallback>, Result<SimulationResult, RunnerError>);

/// Errors from scheduler commands.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The loop task panicked or was cancelled.
    #[error("simulation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The loop stopped on a tick error.
    #[error("simulation loop failed: {0}")]
    Runner(#[from] RunnerError),

    /// A tick interval outside the accepted range.
    #[error("tick interval {0} ms is out of range")]
    InvalidSpeed(u64),

    /// The phase channel closed before the awaited phase was reached.
    #[error("phase channel closed")]
    PhaseWatchClosed,
}

/// Owner of the simulation and its loop task.
pub struct Scheduler {
    config: SimulationConfig,
    simulation: Arc<Mutex<Simulation>>,
    operator: Arc<OperatorState>,
    events: EventBus,
    task: Mutex<Option<JoinHandle<LoopOutput>>>,
}

impl Scheduler {
    /// Build a run from `config` and spawn its loop, parked until
    /// [`start`](Self::start) or [`begin_experiment`](Self::begin_experiment).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: SimulationConfig, callback: Box<dyn TickCallback>) -> Self {
        let simulation = Simulation::new(config.clone());
        Self::with_simulation(config, simulation, callback)
    }

    /// Like [`spawn`](Self::spawn), but adopt an already built first run.
    /// Later runs are still built from `config`.
    pub fn with_simulation(
        config: SimulationConfig,
        simulation: Simulation,
        callback: Box<dyn TickCallback>,
    ) -> Self {
        let simulation = Arc::new(Mutex::new(simulation));
        let operator = Arc::new(OperatorState::new(config.runner.tick_interval_ms, true));
        let events = EventBus::new();
        let task = spawn_loop(&simulation, &operator, &events, callback);
        Self {
            config,
            simulation,
            operator,
            events,
            task: Mutex::new(Some(task)),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Shared simulation state.
    pub const fn simulation(&self) -> &Arc<Mutex<Simulation>> {
        &self.simulation
    }

    /// Shared operator state.
    pub const fn operator(&self) -> &Arc<OperatorState> {
        &self.operator
    }

    /// Event bus.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SimulationEvent> {
        self.events.subscribe()
    }

    /// Current status.
    pub async fn status(&self) -> StatusView {
        self.simulation.lock().await.status(self.operator.run_state())
    }

    /// Operator view of the loop.
    pub async fn operator_status(&self) -> OperatorStatus {
        let (tick, phase, agents_alive, negotiations) = {
            let simulation = self.simulation.lock().await;
            (
                simulation.tick(),
                simulation.phase(),
                u64::try_from(simulation.population().len()).unwrap_or(u64::MAX),
                u64::try_from(simulation.population().negotiation_count()).unwrap_or(u64::MAX),
            )
        };
        OperatorStatus {
            tick,
            phase,
            paused: self.operator.is_paused(),
            stop_requested: self.operator.is_stop_requested(),
            tick_interval_ms: self.operator.tick_interval_ms(),
            elapsed_seconds: self.operator.elapsed_seconds(),
            agents_alive,
            negotiations,
            end_reason: self.operator.end_reason().await,
            started_at: self.operator.started_at().to_rfc3339(),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Resume the loop. Returns whether it was paused.
    pub fn start(&self) -> bool {
        let changed = self.operator.resume();
        if changed {
            info!("run started");
            self.events.publish(SimulationEvent::RunStateChanged {
                state: RunState::Running,
            });
        }
        changed
    }

    /// Pause the loop at the next tick boundary. Returns whether it was
    /// running.
    pub fn pause(&self) -> bool {
        let changed = self.operator.pause();
        if changed {
            info!("run paused");
            self.events.publish(SimulationEvent::RunStateChanged {
                state: RunState::Paused,
            });
        }
        changed
    }

    /// Enter the initialization phase and start the loop. Acts only before
    /// the experiment has begun; returns whether the phase changed.
    pub async fn begin_experiment(&self) -> bool {
        let changed = self.simulation.lock().await.begin_experiment();
        if changed {
            self.events.publish(SimulationEvent::PhaseChanged {
                phase: ExperimentPhase::Initializing,
            });
            self.start();
        }
        changed
    }

    /// Set the tick interval. Returns the previous one.
    pub fn set_speed(&self, tick_interval_ms: u64) -> Result<u64, SchedulerError> {
        self.operator
            .set_tick_interval_ms(tick_interval_ms)
            .ok_or(SchedulerError::InvalidSpeed(tick_interval_ms))
    }

    /// Stop the current loop, wait for it to exit, rebuild the simulation
    /// from the original configuration, and park a fresh loop.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Join`] if the old loop task panicked. The
    /// new run is still created, with a no-op callback.
    pub async fn new_run(&self) -> Result<(), SchedulerError> {
        let stopped = self.stop_loop().await;
        let (callback, join_error) = match stopped {
            Ok(Some((callback, result))) => {
                report(result);
                (callback, None)
            }
            Ok(None) => (Box::new(runner::NoOpCallback) as Box<dyn TickCallback>, None),
            Err(err) => (Box::new(runner::NoOpCallback) as Box<dyn TickCallback>, Some(err)),
        };

        let fresh = Simulation::new(self.config.clone());
        let run_id = fresh.run_id();
        *self.simulation.lock().await = fresh;
        self.operator.rearm(true).await;
        let task = spawn_loop(&self.simulation, &self.operator, &self.events, callback);
        *self.task.lock().await = Some(task);
        info!(%run_id, "new run created");

        self.events.publish_all([
            SimulationEvent::RunStateChanged {
                state: RunState::Paused,
            },
            SimulationEvent::TickChanged { tick: 0 },
            SimulationEvent::PhaseChanged {
                phase: ExperimentPhase::NotInitialized,
            },
            SimulationEvent::PopulationChanged,
        ]);
        join_error.map_or(Ok(()), |err| Err(SchedulerError::Join(err)))
    }

    /// Block until the published phase equals `phase`.
    pub async fn wait_for_phase(&self, phase: ExperimentPhase) -> Result<(), SchedulerError> {
        let mut rx = self.events.watch_phase();
        rx.wait_for(|current| *current == phase)
            .await
            .map(|_| ())
            .or(Err(SchedulerError::PhaseWatchClosed))
    }

    /// Stop the loop and wait for it to exit. Returns how it ended, if a
    /// loop was running.
    pub async fn shutdown(&self) -> Result<Option<SimulationResult>, SchedulerError> {
        match self.stop_loop().await? {
            Some((_, result)) => {
                let result = result?;
                runner::log_simulation_end(&result);
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn stop_loop(&self) -> Result<Option<LoopOutput>, tokio::task::JoinError> {
        self.operator.request_stop();
        let handle = self.task.lock().await.take();
        match handle {
            Some(handle) => Ok(Some(handle.await?)),
            None => Ok(None),
        }
    }
}

fn spawn_loop(
    simulation: &Arc<Mutex<Simulation>>,
    operator: &Arc<OperatorState>,
    events: &EventBus,
    mut callback: Box<dyn TickCallback>,
) -> JoinHandle<LoopOutput> {
    let simulation = Arc::clone(simulation);
    let operator = Arc::clone(operator);
    let events = events.clone();
    tokio::spawn(async move {
        let result = runner::run_simulation(&simulation, &operator, &events, callback.as_mut()).await;
        (callback, result)
    })
}

fn report(result: Result<SimulationResult, RunnerError>) {
    match result {
        Ok(result) => runner::log_simulation_end(&result),
        Err(err) => error!(error = %err, "simulation loop failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::operator::SimulationEndReason;
    use crate::tick::small_config;

    fn scheduler(seed: u64) -> Scheduler {
        Scheduler::spawn(small_config(seed), Box::new(runner::NoOpCallback))
    }

    #[tokio::test]
    async fn loop_starts_parked() {
        let scheduler = scheduler(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.status().await.tick, 0);
        assert_eq!(scheduler.status().await.run_state, RunState::Paused);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn start_and_pause_are_idempotent() {
        let scheduler = scheduler(2);
        let mut rx = scheduler.subscribe();
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.pause());
        assert!(!scheduler.pause());

        let mut state_changes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SimulationEvent::RunStateChanged { state } = event {
                state_changes.push(state);
            }
        }
        assert_eq!(state_changes, vec![RunState::Running, RunState::Paused]);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn begin_experiment_only_once() {
        let scheduler = scheduler(3);
        assert!(scheduler.begin_experiment().await);
        assert!(!scheduler.begin_experiment().await);
        assert!(!scheduler.operator().is_paused());
        scheduler.wait_for_phase(ExperimentPhase::Initializing).await.unwrap();
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn running_loop_advances_ticks() {
        let scheduler = scheduler(4);
        scheduler.start();
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.status().await.tick < 10 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let result = scheduler.shutdown().await.unwrap().unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert!(result.total_ticks >= 10);
    }

    #[tokio::test]
    async fn new_run_resets_state_and_emits_all_notifications() {
        let scheduler = scheduler(5);
        let first_run = scheduler.status().await.run_id;
        scheduler.begin_experiment().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut rx = scheduler.subscribe();
        scheduler.new_run().await.unwrap();

        let status = scheduler.status().await;
        assert_ne!(status.run_id, first_run);
        assert_eq!(status.tick, 0);
        assert_eq!(status.phase, ExperimentPhase::NotInitialized);
        assert_eq!(status.run_state, RunState::Paused);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&SimulationEvent::PopulationChanged));
        assert!(seen.contains(&SimulationEvent::TickChanged { tick: 0 }));
        assert!(seen.contains(&SimulationEvent::RunStateChanged {
            state: RunState::Paused
        }));
        assert!(seen.contains(&SimulationEvent::PhaseChanged {
            phase: ExperimentPhase::NotInitialized
        }));

        assert!(scheduler.start());
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn set_speed_validates_range() {
        let scheduler = scheduler(6);
        assert_eq!(scheduler.set_speed(25).unwrap(), 0);
        assert!(matches!(
            scheduler.set_speed(u64::MAX),
            Err(SchedulerError::InvalidSpeed(_))
        ));
        let status = scheduler.operator_status().await;
        assert_eq!(status.tick_interval_ms, 25);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let scheduler = scheduler(7);
        assert!(scheduler.shutdown().await.unwrap().is_some());
        assert!(scheduler.shutdown().await.unwrap().is_none());
    }
}
