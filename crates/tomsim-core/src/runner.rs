//! Simulation loop runner with operator controls.
//!
//! This module provides [`run_simulation`], the async function that drives
//! the tick loop with support for:
//!
//! - **Pause/resume**: the operator can park and continue the loop; the
//!   simulation itself requests a pause at phase changes and on halt
//! - **Variable tick speed**: tick interval adjustable at runtime
//! - **Clean stop**: a stop request is observed at the next tick boundary
//! - **Headless finish**: the loop ends on its own once the experiment is
//!   exported
//!
//! The runner wraps [`Simulation::run_tick`] and adds the control plane
//! around it. Events are published only after the simulation lock has
//! been released.

use std::sync::Arc;

use tokio::sync::Mutex;
use tomsim_types::{ExperimentPhase, RunState};
use tracing::{info, warn};

use crate::events::{EventBus, SimulationEvent};
use crate::operator::{OperatorState, SimulationEndReason};
use crate::tick::{Simulation, TickError, TickSummary};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the loop ended.
    pub end_reason: SimulationEndReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks executed by this loop.
    pub total_ticks: u64,
}

/// Callback invoked after each tick completes.
///
/// Implementations can use this to refresh an observer snapshot. The
/// callback runs while the simulation lock is held, so it must not block.
pub trait TickCallback: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary, simulation: &Simulation);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _simulation: &Simulation) {}
}

/// Events describing what changed during one tick, in publication order.
pub fn tick_events(summary: &TickSummary) -> Vec<SimulationEvent> {
    let mut events = vec![
        SimulationEvent::PopulationChanged,
        SimulationEvent::TickChanged { tick: summary.tick },
    ];
    if let Some(phase) = summary.phase_change {
        events.push(SimulationEvent::PhaseChanged { phase });
    }
    events
}

/// Run the simulation loop until a stop is requested or, in headless mode,
/// the experiment finishes.
///
/// # Arguments
///
/// * `simulation` - Shared simulation state, locked once per tick
/// * `operator` - Shared operator control state
/// * `events` - Bus that receives change notifications
/// * `callback` - Called after each tick, under the lock
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick execution fails unrecoverably.
pub async fn run_simulation(
    simulation: &Arc<Mutex<Simulation>>,
    operator: &Arc<OperatorState>,
    events: &EventBus,
    callback: &mut dyn TickCallback,
) -> Result<SimulationResult, RunnerError> {
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        tick_interval_ms = operator.tick_interval_ms(),
        paused = operator.is_paused(),
        "Simulation loop starting"
    );

    loop {
        // --- Check pause ---
        if operator.is_paused() && !operator.is_stop_requested() {
            info!("Simulation paused, waiting for resume...");
            operator.wait_if_paused().await;
            if !operator.is_stop_requested() {
                info!("Simulation resumed");
            }
        }

        // --- Check stop request (before tick) ---
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            return Ok(finish(operator, SimulationEndReason::OperatorStop, last_summary, total_ticks).await);
        }

        // --- Execute tick ---
        let (summary, headless) = {
            let mut guard = simulation.lock().await;
            let summary = guard.run_tick()?;
            callback.on_tick(&summary, &guard);
            (summary, guard.config().runner.headless)
        };
        total_ticks = total_ticks.saturating_add(1);

        // --- Notify ---
        events.publish_all(tick_events(&summary));
        if let Some(phase) = summary.phase_change {
            info!(tick = summary.tick, %phase, "Phase changed");
        }
        if summary.halted {
            warn!(tick = summary.tick, "Replacement halted on an empty population");
        }
        if summary.pause_requested && operator.pause() {
            events.publish(SimulationEvent::RunStateChanged {
                state: RunState::Paused,
            });
        }

        // --- Headless finish ---
        if headless && summary.phase_change == Some(ExperimentPhase::Finished) {
            return Ok(finish(
                operator,
                SimulationEndReason::ExperimentFinished,
                Some(summary),
                total_ticks,
            )
            .await);
        }

        last_summary = Some(summary);

        // --- Sleep for tick interval ---
        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

async fn finish(
    operator: &OperatorState,
    reason: SimulationEndReason,
    final_summary: Option<TickSummary>,
    total_ticks: u64,
) -> SimulationResult {
    operator.set_end_reason(reason).await;
    SimulationResult {
        end_reason: reason,
        final_summary,
        total_ticks,
    }
}

/// Log the end of a run loop.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        "Simulation loop ended"
    );
    if let Some(ref summary) = result.final_summary {
        info!(
            tick = summary.tick,
            phase = %summary.phase,
            tom0 = summary.counts.tom0,
            tom1 = summary.counts.tom1,
            tom2 = summary.counts.tom2,
            "Final tick summary"
        );
    } else {
        warn!("Simulation loop ended with no ticks executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tick::small_config;

    fn shared(simulation: Simulation) -> Arc<Mutex<Simulation>> {
        Arc::new(Mutex::new(simulation))
    }

    struct StopAfter {
        remaining: u64,
        operator: Arc<OperatorState>,
    }

    impl TickCallback for StopAfter {
        fn on_tick(&mut self, _summary: &TickSummary, _simulation: &Simulation) {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.operator.request_stop();
            }
        }
    }

    #[tokio::test]
    async fn operator_stop_before_first_tick() {
        let simulation = shared(Simulation::new(small_config(1)));
        let operator = Arc::new(OperatorState::new(0, false));
        operator.request_stop();
        let result = run_simulation(&simulation, &operator, &EventBus::new(), &mut NoOpCallback)
            .await
            .unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_summary.is_none());
    }

    #[tokio::test]
    async fn stop_is_observed_at_the_next_tick_boundary() {
        let simulation = shared(Simulation::new(small_config(2)));
        let operator = Arc::new(OperatorState::new(0, false));
        let mut callback = StopAfter {
            remaining: 5,
            operator: Arc::clone(&operator),
        };
        let result = run_simulation(&simulation, &operator, &EventBus::new(), &mut callback)
            .await
            .unwrap();
        assert_eq!(result.total_ticks, 5);
        assert_eq!(simulation.lock().await.tick(), 5);
        assert_eq!(operator.end_reason().await, Some(SimulationEndReason::OperatorStop));
    }

    #[tokio::test]
    async fn events_follow_each_tick() {
        let simulation = shared(Simulation::new(small_config(3)));
        let operator = Arc::new(OperatorState::new(0, false));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut callback = StopAfter {
            remaining: 1,
            operator: Arc::clone(&operator),
        };
        run_simulation(&simulation, &operator, &bus, &mut callback)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), SimulationEvent::PopulationChanged);
        assert_eq!(rx.recv().await.unwrap(), SimulationEvent::TickChanged { tick: 1 });
    }

    #[tokio::test]
    async fn phase_change_pauses_the_loop() {
        let mut config = small_config(4);
        config.experiment.initialization_ticks = 3;
        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        let simulation = shared(simulation);
        let operator = Arc::new(OperatorState::new(0, false));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let task = {
            let simulation = Arc::clone(&simulation);
            let operator = Arc::clone(&operator);
            let bus = bus.clone();
            tokio::spawn(async move {
                run_simulation(&simulation, &operator, &bus, &mut NoOpCallback).await
            })
        };

        let mut paused = false;
        while let Ok(event) = rx.recv().await {
            if event == (SimulationEvent::RunStateChanged { state: RunState::Paused }) {
                paused = true;
                break;
            }
        }
        assert!(paused);
        assert!(operator.is_paused());
        assert_eq!(bus.phase(), ExperimentPhase::Experimenting);
        assert_eq!(simulation.lock().await.phase(), ExperimentPhase::Experimenting);

        operator.request_stop();
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 3);
    }

    #[tokio::test]
    async fn headless_run_ends_when_the_experiment_finishes() {
        let mut config = small_config(5);
        config.runner.headless = true;
        config.runner.pause_at_phase_change = false;
        config.experiment.initialization_ticks = 2;
        config.experiment.scored_ticks = 4;
        let dir = std::env::temp_dir().join(format!("tomsim-runner-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        config.export.directory = dir.clone();

        let mut simulation = Simulation::new(config);
        simulation.begin_experiment();
        let simulation = shared(simulation);
        let operator = Arc::new(OperatorState::new(0, false));
        let result = run_simulation(&simulation, &operator, &EventBus::new(), &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SimulationEndReason::ExperimentFinished);
        assert_eq!(simulation.lock().await.phase(), ExperimentPhase::Finished);
        assert!(simulation.lock().await.last_export().is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tick_events_include_phase_change() {
        let summary = TickSummary {
            tick: 0,
            phase: ExperimentPhase::Experimenting,
            counts: tomsim_types::PopulationCounts::default(),
            negotiations_opened: 0,
            negotiations_finished: 0,
            deaths: 0,
            births: 0,
            phase_change: Some(ExperimentPhase::Experimenting),
            pause_requested: true,
            halted: false,
        };
        assert_eq!(
            tick_events(&summary),
            vec![
                SimulationEvent::PopulationChanged,
                SimulationEvent::TickChanged { tick: 0 },
                SimulationEvent::PhaseChanged {
                    phase: ExperimentPhase::Experimenting
                },
            ]
        );
    }
}
