//! Enumeration types for the negotiation simulation.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// ToM order
// ---------------------------------------------------------------------------

/// Recursion depth of an agent's strategic reasoning.
///
/// Fixed when the agent is created. A mutation produces a new agent of a
/// possibly different order; an existing agent never changes order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ToMOrder {
    /// Does not model the opponent's reasoning.
    #[serde(rename = "tom0")]
    Zero,
    /// Models the opponent as a ToM0 reasoner.
    #[serde(rename = "tom1")]
    One,
    /// Models the opponent as a ToM1 reasoner.
    #[serde(rename = "tom2")]
    Two,
}

impl ToMOrder {
    /// All orders, lowest first.
    pub const ALL: [Self; 3] = [Self::Zero, Self::One, Self::Two];

    /// Zero-based index, usable for per-order tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
        }
    }

    /// Inverse of [`Self::index`].
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Zero),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    /// The order one level down, if any.
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Zero => None,
            Self::One => Some(Self::Zero),
            Self::Two => Some(Self::One),
        }
    }
}

impl core::fmt::Display for ToMOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ToM{}", self.index())
    }
}

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// Position of a participant inside a negotiation.
///
/// The first seat makes the opening offer; turns alternate by round parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// Seat 0, the first mover.
    First,
    /// Seat 1, the responder.
    Second,
}

impl Seat {
    /// Both seats in order.
    pub const BOTH: [Self; 2] = [Self::First, Self::Second];

    /// 0 for the first seat, 1 for the second.
    pub const fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The counterpart's seat.
    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    /// Pick the element of a pair belonging to this seat.
    pub const fn pick<T: Copy>(self, pair: [T; 2]) -> T {
        match self {
            Self::First => pair[0],
            Self::Second => pair[1],
        }
    }
}

// ---------------------------------------------------------------------------
// Experiment lifecycle
// ---------------------------------------------------------------------------

/// Phase of the two-phase experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    /// Agents move and trade, but no phase rules apply.
    NotInitialized,
    /// ToM0-only population establishing baseline beliefs.
    Initializing,
    /// Mixed population under survival pressure.
    Experimenting,
    /// Results exported; the run is over.
    Finished,
}

impl core::fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::NotInitialized => "not initialized",
            Self::Initializing => "initializing",
            Self::Experimenting => "experimenting",
            Self::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Whether the simulation loop is advancing ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Ticks are advancing.
    Running,
    /// The loop is parked at a tick boundary.
    Paused,
}

/// Which flavour of the experiment is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ExperimentVariant {
    /// Opponent models start fresh in every negotiation.
    #[default]
    Standard,
    /// Agents remember their opponent model per partner and avoid recent
    /// unsuccessful partners.
    UseExperience,
}

impl ExperimentVariant {
    /// Numeric experiment type as used on the command line (1 or 2).
    pub const fn code(self) -> u8 {
        match self {
            Self::Standard => 1,
            Self::UseExperience => 2,
        }
    }

    /// Parse the numeric experiment type.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Standard),
            2 => Some(Self::UseExperience),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Negotiation endings
// ---------------------------------------------------------------------------

/// How a negotiation terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NegotiationEnding {
    /// The round cap was reached without agreement.
    TooLong,
    /// The given seat walked away.
    Withdrawn {
        /// Seat that withdrew.
        by: Seat,
    },
    /// The given seat accepted the offer on the table.
    Accepted {
        /// Seat that accepted.
        by: Seat,
    },
}

impl NegotiationEnding {
    /// Export code: -1 too long, 0/1 withdrawal by seat 0/1, 2/3 acceptance
    /// by seat 0/1.
    pub const fn code(self) -> i8 {
        match self {
            Self::TooLong => -1,
            Self::Withdrawn { by: Seat::First } => 0,
            Self::Withdrawn { by: Seat::Second } => 1,
            Self::Accepted { by: Seat::First } => 2,
            Self::Accepted { by: Seat::Second } => 3,
        }
    }

    /// Whether resources changed hands.
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}
