//! Operator control state for runtime simulation management.
//!
//! This module provides shared atomic state used by the run loop, the
//! scheduler, and the operator REST API. The operator can pause and resume,
//! change tick speed, and request a clean stop without touching the
//! simulation itself.
//!
//! # Architecture
//!
//! All mutable control fields use [`std::sync::atomic`] types so they can be
//! shared between the loop task and the Axum handler tasks without locks on
//! the hot path. A stop request is observed once per tick, at the tick
//! boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tomsim_types::{ExperimentPhase, RunState};

/// Longest accepted tick interval.
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Reason why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// An operator or the scheduler requested a stop.
    OperatorStop,
    /// The scored phase finished in headless mode.
    ExperimentFinished,
}

/// Shared operator control state.
///
/// Wrapped in [`std::sync::Arc`] and shared between the run loop, the
/// scheduler, and operator API handlers.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether the loop is parked at a tick boundary.
    paused: AtomicBool,

    /// Wakes the loop when resumed or stopped.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Delay between ticks in milliseconds (runtime-adjustable).
    tick_interval_ms: AtomicU64,

    /// Wall-clock time the operator state was created.
    started_at: DateTime<Utc>,

    /// Reason the loop ended, if it has.
    end_reason: Mutex<Option<SimulationEndReason>>,
}

impl OperatorState {
    /// Create operator state, optionally starting paused.
    pub fn new(tick_interval_ms: u64, start_paused: bool) -> Self {
        Self {
            paused: AtomicBool::new(start_paused),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            tick_interval_ms: AtomicU64::new(tick_interval_ms.min(MAX_TICK_INTERVAL_MS)),
            started_at: Utc::now(),
            end_reason: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether the loop is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Current run state as seen by observers.
    pub fn run_state(&self) -> RunState {
        if self.is_paused() {
            RunState::Paused
        } else {
            RunState::Running
        }
    }

    /// Pause the loop at the next tick boundary. Returns whether the state
    /// changed.
    pub fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::AcqRel)
    }

    /// Resume the loop and wake it. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        let changed = self.paused.swap(false, Ordering::AcqRel);
        self.resume_notify.notify_one();
        changed
    }

    /// Wait until the loop is no longer paused or a stop is requested.
    ///
    /// Returns immediately if not paused.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            self.resume_notify.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. A paused loop is woken so it can observe it.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Clear the stop flag and end reason before a fresh loop starts.
    pub async fn rearm(&self, start_paused: bool) {
        self.stop_requested.store(false, Ordering::Release);
        self.paused.store(start_paused, Ordering::Release);
        *self.end_reason.lock().await = None;
    }

    /// Record the reason the loop ended.
    pub async fn set_end_reason(&self, reason: SimulationEndReason) {
        let mut guard = self.end_reason.lock().await;
        *guard = Some(reason);
    }

    /// Get the reason the loop ended, if it has.
    pub async fn end_reason(&self) -> Option<SimulationEndReason> {
        *self.end_reason.lock().await
    }

    // -----------------------------------------------------------------------
    // Tick Speed
    // -----------------------------------------------------------------------

    /// Get the current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Set the tick interval in milliseconds. Zero runs ticks back to back.
    ///
    /// Returns the previous interval on success, or `None` if the value
    /// exceeds [`MAX_TICK_INTERVAL_MS`].
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms > MAX_TICK_INTERVAL_MS {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    // -----------------------------------------------------------------------
    // Wall clock
    // -----------------------------------------------------------------------

    /// Return the wall-clock start time.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Return elapsed seconds since start.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        // `num_seconds` can be negative if clocks are weird; treat as 0.
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

/// JSON-serializable status for the operator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorStatus {
    /// Ticks elapsed in the current phase.
    pub tick: u64,
    /// Experiment phase.
    pub phase: ExperimentPhase,
    /// Whether the loop is paused.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Current tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Elapsed wall-clock seconds since the process started.
    pub elapsed_seconds: u64,
    /// Number of agents currently alive.
    pub agents_alive: u64,
    /// Negotiations in progress.
    pub negotiations: u64,
    /// The reason the loop ended, if applicable.
    pub end_reason: Option<SimulationEndReason>,
    /// ISO 8601 timestamp of when the operator state was created.
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn initial_state_follows_constructor() {
        let state = OperatorState::new(0, false);
        assert!(!state.is_paused());
        assert!(!state.is_stop_requested());
        assert_eq!(state.run_state(), RunState::Running);

        let paused = OperatorState::new(0, true);
        assert_eq!(paused.run_state(), RunState::Paused);
    }

    #[test]
    fn pause_and_resume_report_changes() {
        let state = OperatorState::new(0, false);
        assert!(state.pause());
        assert!(!state.pause());
        assert!(state.is_paused());
        assert!(state.resume());
        assert!(!state.resume());
        assert!(!state.is_paused());
    }

    #[test]
    fn stop_request() {
        let state = OperatorState::new(0, false);
        assert!(!state.is_stop_requested());
        state.request_stop();
        assert!(state.is_stop_requested());
    }

    #[test]
    fn set_tick_interval() {
        let state = OperatorState::new(10, false);
        assert_eq!(state.tick_interval_ms(), 10);
        assert_eq!(state.set_tick_interval_ms(0), Some(10));
        assert_eq!(state.tick_interval_ms(), 0);
        assert!(state.set_tick_interval_ms(MAX_TICK_INTERVAL_MS.saturating_add(1)).is_none());
        assert_eq!(state.tick_interval_ms(), 0);
    }

    #[tokio::test]
    async fn resume_wakes_a_waiting_loop() {
        let state = Arc::new(OperatorState::new(0, true));
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_if_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        state.resume();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn stop_wakes_a_paused_loop() {
        let state = Arc::new(OperatorState::new(0, true));
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_if_paused().await })
        };
        state.request_stop();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.is_ok());
        assert!(state.is_paused());
    }

    #[tokio::test]
    async fn rearm_clears_stop_and_reason() {
        let state = OperatorState::new(0, false);
        state.request_stop();
        state.set_end_reason(SimulationEndReason::OperatorStop).await;
        assert_eq!(state.end_reason().await, Some(SimulationEndReason::OperatorStop));

        state.rearm(true).await;
        assert!(!state.is_stop_requested());
        assert!(state.is_paused());
        assert!(state.end_reason().await.is_none());
    }
}
