//! Agents, beliefs, and the negotiation protocol for the ToM simulation.
//!
//! This crate is the logic layer of the simulation: scoring, belief
//! bookkeeping, recursive theory-of-mind reasoning, and the negotiation
//! protocol that ties them together. It performs no I/O and owns no clock.
//! Randomness is passed in by the caller, so a seeded generator reproduces
//! every decision. It sits between `tomsim-types` (shared data structures)
//! and `tomsim-core` (population, scheduling, and export).
//!
//! # Modules
//!
//! - [`agent`] -- Agent state and lifecycle ([`Agent`], [`AgentSpawn`])
//! - [`beliefs`] -- Offer statistics, priors, offer beliefs, and opponent models ([`Mind`])
//! - [`config`] -- Reasoning parameters ([`NegotiationConfig`])
//! - [`error`] -- Error types for agent operations ([`AgentError`])
//! - [`lineage`] -- Replacement agents with inheritance and mutation
//! - [`negotiation`] -- The alternating-offers protocol ([`Negotiation`])
//! - [`offers`] -- Enumeration of candidate offers
//! - [`reasoning`] -- ToM0/ToM1/ToM2 expected-value reasoning ([`Reasoner`])
//! - [`score`] -- The utility function over resource vectors
//! - [`survival`] -- Periodic survival checks

pub mod agent;
pub mod beliefs;
pub mod config;
pub mod error;
pub mod lineage;
pub mod negotiation;
pub mod offers;
pub mod reasoning;
pub mod score;
pub mod survival;

// Re-export primary types at crate root for convenience.
pub use agent::{Activity, Agent, AgentSpawn, BeliefLayer, PartnerMemory, UNSUCCESSFUL_MEMORY};
pub use beliefs::{Evidence, Mind, OfferBeliefs, OfferStats, OpponentModel, PriorMatrix, ProducerBelief};
pub use config::NegotiationConfig;
pub use error::AgentError;
pub use lineage::{Descent, Parentage, choose_parentage, pick_donor};
pub use negotiation::{Negotiation, NegotiationReport, RoundOutcome};
pub use offers::{CandidateOffers, candidate_offers};
pub use reasoning::{Reasoner, Scratch, Table, TurnChoice};
pub use score::{score, score_after};
pub use survival::{CheckOutcome, SurvivalVerdict};
