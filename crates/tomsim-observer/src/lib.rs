//! Observer API server for the ToM simulation.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/events`) streaming every
//!   [`SimulationEvent`](tomsim_core::SimulationEvent) as JSON
//! - **REST endpoints** for run status, agents, and population history
//! - **Operator REST endpoints** for the controller commands (new run,
//!   start, pause, begin experiment) plus speed and loop status
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The observer reads from an in-memory [`SimulationSnapshot`] that the
//! engine refreshes after every tick, so REST reads never wait on the
//! simulation lock. Commands go through the [`Scheduler`], which applies
//! them between ticks.
//!
//! [`SimulationSnapshot`]: state::SimulationSnapshot
//! [`Scheduler`]: tomsim_core::Scheduler

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::{AppState, SimulationSnapshot};
