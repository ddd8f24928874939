//! Change notifications published by the simulation.
//!
//! Consumers subscribe to an [`EventBus`] instead of the core calling into
//! any display code. Events are sent after the mutation they describe has
//! completed and the simulation lock has been released.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tomsim_types::{ExperimentPhase, RunState};

/// Capacity of the event broadcast channel.
///
/// A subscriber that falls further behind receives
/// [`broadcast::error::RecvError::Lagged`] and skips ahead.
const BROADCAST_CAPACITY: usize = 256;

/// A change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationEvent {
    /// Agents were added, removed, moved, or changed state.
    PopulationChanged,
    /// The tick counter advanced or was reset.
    TickChanged {
        /// New tick value.
        tick: u64,
    },
    /// The loop started or paused.
    RunStateChanged {
        /// New run state.
        state: RunState,
    },
    /// The experiment moved to another phase.
    PhaseChanged {
        /// New phase.
        phase: ExperimentPhase,
    },
}

/// Fan-out of [`SimulationEvent`]s plus a watchable current phase.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SimulationEvent>,
    phase: watch::Sender<ExperimentPhase>,
}

impl EventBus {
    /// New bus starting in [`ExperimentPhase::NotInitialized`].
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (phase, _) = watch::channel(ExperimentPhase::NotInitialized);
        Self { tx, phase }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.tx.subscribe()
    }

    /// Watch the current phase.
    pub fn watch_phase(&self) -> watch::Receiver<ExperimentPhase> {
        self.phase.subscribe()
    }

    /// Latest published phase.
    pub fn phase(&self) -> ExperimentPhase {
        *self.phase.borrow()
    }

    /// Publish one event. Having no subscribers is not an error.
    pub fn publish(&self, event: SimulationEvent) {
        if let SimulationEvent::PhaseChanged { phase } = event {
            self.phase.send_replace(phase);
        }
        let _ = self.tx.send(event);
    }

    /// Publish a batch in order.
    pub fn publish_all<I: IntoIterator<Item = SimulationEvent>>(&self, events: I) {
        for event in events {
            self.publish(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish_all([
            SimulationEvent::TickChanged { tick: 1 },
            SimulationEvent::PopulationChanged,
        ]);
        assert_eq!(rx.recv().await.unwrap(), SimulationEvent::TickChanged { tick: 1 });
        assert_eq!(rx.recv().await.unwrap(), SimulationEvent::PopulationChanged);
    }

    #[test]
    fn phase_watch_tracks_phase_events() {
        let bus = EventBus::new();
        let rx = bus.watch_phase();
        bus.publish(SimulationEvent::PhaseChanged {
            phase: ExperimentPhase::Experimenting,
        });
        assert_eq!(*rx.borrow(), ExperimentPhase::Experimenting);
        assert_eq!(bus.phase(), ExperimentPhase::Experimenting);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(SimulationEvent::RunStateChanged {
            state: RunState::Paused,
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&SimulationEvent::TickChanged { tick: 7 }).unwrap();
        assert_eq!(json, r#"{"type":"tick_changed","tick":7}"#);
    }
}
