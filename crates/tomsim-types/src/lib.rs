//! Shared type definitions for the Theory-of-Mind negotiation simulation.
//!
//! This crate is the single source of truth for the vocabulary used across
//! the workspace. Types flow downstream to `TypeScript` via `ts-rs` for any
//! dashboard that consumes the observer API.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier wrappers (serial agent ids, UUID run ids)
//! - [`enums`] -- ToM orders, seats, phases, run states, negotiation endings
//! - [`resources`] -- Resource vectors, offers, and the quantity constants
//! - [`structs`] -- Read-only views of agents and population counts

pub mod enums;
pub mod ids;
pub mod resources;
pub mod structs;

pub use enums::{ExperimentPhase, ExperimentVariant, NegotiationEnding, RunState, Seat, ToMOrder};
pub use ids::{AgentId, NegotiationId, RunId};
pub use resources::{MAX_QUANTITY, Offer, RESOURCE_KINDS, Resources, SURVIVAL_THRESHOLD};
pub use structs::{AgentView, PopulationCounts, Position, StatusView};
