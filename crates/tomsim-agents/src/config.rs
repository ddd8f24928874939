//! Tunable parameters for negotiation reasoning.
//!
//! These values map to the `negotiation` section of `tomsim.yaml`. The
//! [`NegotiationConfig`] struct is handed to every reasoning call so that
//! tests can tighten or loosen the numeric tolerances.

use serde::{Deserialize, Serialize};

/// Parameters shared by the reasoning engine and the negotiation protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Rate used both for belief decay (`(1 - rate)^m`) and for the
    /// confidence moving average (default: 0.8).
    #[serde(default = "default_learning_speed")]
    pub learning_speed: f64,

    /// Minimum difference for two expected values to count as distinct
    /// (default: 1e-6).
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Round at which a negotiation is abandoned as too long (default: 50).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

const fn default_learning_speed() -> f64 {
    0.8
}

const fn default_epsilon() -> f64 {
    1e-6
}

const fn default_max_rounds() -> u32 {
    50
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            learning_speed: default_learning_speed(),
            epsilon: default_epsilon(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl NegotiationConfig {
    /// Strictly greater by more than the tolerance.
    pub fn exceeds(&self, value: f64, other: f64) -> bool {
        value > other && (value - other).abs() > self.epsilon
    }

    /// Within the tolerance of each other.
    pub fn close(&self, value: f64, other: f64) -> bool {
        (value - other).abs() < self.epsilon
    }
}
