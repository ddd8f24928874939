//! Periodic survival checks.
//!
//! Every `check_interval` ticks of an agent's age, each non-producing kind
//! is compared against [`SURVIVAL_THRESHOLD`]. The first kind that falls
//! short starves the agent. Survivors pay one unit of everything they hold.

use tomsim_types::{Resources, SURVIVAL_THRESHOLD};

use crate::agent::Agent;

/// Outcome of a survival check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurvivalVerdict {
    /// All non-producing kinds are at or above the threshold.
    Survives,
    /// The given non-producing kind fell below the threshold.
    Starves {
        /// First kind found short.
        kind: usize,
    },
}

/// What the population must do after checking one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Not due, or survived (the reduction may be deferred).
    Alive,
    /// Starved while negotiating; removal waits for the negotiation.
    Dying,
    /// Starved and free; remove it now.
    Dead,
}

/// Judge a resource vector held by an agent producing `producing`.
pub fn verdict(resources: &Resources, producing: usize) -> SurvivalVerdict {
    resources
        .iter()
        .find(|(kind, quantity)| *kind != producing && *quantity < SURVIVAL_THRESHOLD)
        .map_or(SurvivalVerdict::Survives, |(kind, _)| SurvivalVerdict::Starves { kind })
}

/// Whether an agent of `age` is due a check.
pub const fn is_check_due(age: u64, check_interval: u64) -> bool {
    match age.checked_rem(check_interval) {
        Some(rest) => rest == 0,
        None => false,
    }
}

/// Run the survival check on `agent` if one is due.
pub fn check(agent: &mut Agent, check_interval: u64) -> CheckOutcome {
    if !is_check_due(agent.age(), check_interval) {
        return CheckOutcome::Alive;
    }
    match verdict(&agent.resources(), agent.producing()) {
        SurvivalVerdict::Survives => {
            agent.reduce_resources();
            CheckOutcome::Alive
        }
        SurvivalVerdict::Starves { kind } => {
            tracing::debug!(agent = %agent.id(), kind, age = agent.age(), "agent starved");
            if agent.is_negotiating() {
                agent.mark_dying();
                CheckOutcome::Dying
            } else {
                CheckOutcome::Dead
            }
        }
    }
}
