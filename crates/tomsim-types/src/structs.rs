//! Read-only views handed to observers and exporters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ExperimentPhase, ExperimentVariant, RunState, ToMOrder};
use crate::ids::{AgentId, RunId};
use crate::resources::Resources;

/// A point in the square arena.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Build a position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Snapshot of one agent for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentView {
    /// Agent identifier.
    pub id: AgentId,
    /// Reasoning depth.
    pub order: ToMOrder,
    /// Location in the arena.
    pub position: Position,
    /// Heading in degrees.
    pub heading: f64,
    /// Age in ticks.
    #[ts(type = "number")]
    pub age: u64,
    /// Kind this agent produces.
    pub producing: u8,
    /// Current stock.
    pub resources: Resources,
    /// Whether the agent is inside a negotiation.
    pub negotiating: bool,
    /// Whether the agent failed a survival check and awaits removal.
    pub dying: bool,
}

/// Live agent counts per ToM order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PopulationCounts {
    /// ToM0 agents.
    pub tom0: u32,
    /// ToM1 agents.
    pub tom1: u32,
    /// ToM2 agents.
    pub tom2: u32,
}

impl PopulationCounts {
    /// Count for one order.
    pub const fn get(&self, order: ToMOrder) -> u32 {
        match order {
            ToMOrder::Zero => self.tom0,
            ToMOrder::One => self.tom1,
            ToMOrder::Two => self.tom2,
        }
    }

    /// Add one agent of the given order.
    pub const fn increment(&mut self, order: ToMOrder) {
        match order {
            ToMOrder::Zero => self.tom0 = self.tom0.saturating_add(1),
            ToMOrder::One => self.tom1 = self.tom1.saturating_add(1),
            ToMOrder::Two => self.tom2 = self.tom2.saturating_add(1),
        }
    }

    /// All agents.
    pub const fn total(&self) -> u32 {
        self.tom0.saturating_add(self.tom1).saturating_add(self.tom2)
    }

    /// Number of orders with at least one live agent.
    pub fn surviving_orders(&self) -> usize {
        ToMOrder::ALL.iter().filter(|o| self.get(**o) > 0).count()
    }

    /// Orders whose count is at least that of every other order.
    pub fn dominant(&self) -> impl Iterator<Item = ToMOrder> + '_ {
        ToMOrder::ALL
            .into_iter()
            .filter(|o| ToMOrder::ALL.iter().all(|other| self.get(*o) >= self.get(*other)))
    }
}

/// Summary of the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StatusView {
    /// Run identifier.
    pub run_id: RunId,
    /// Ticks elapsed in the current phase.
    #[ts(type = "number")]
    pub tick: u64,
    /// Experiment phase.
    pub phase: ExperimentPhase,
    /// Whether the loop is advancing.
    pub run_state: RunState,
    /// Active experiment variant.
    pub variant: ExperimentVariant,
    /// Live agents per order.
    pub counts: PopulationCounts,
    /// Negotiations currently in progress.
    pub negotiations: u32,
    /// Wall-clock time the run was created.
    pub started_at: DateTime<Utc>,
}
