//! Population, tick cycle, and orchestration for the ToM simulation.
//!
//! This crate owns the simulation clock: each tick moves every idle agent,
//! plays one round of every open negotiation, and applies the rules of the
//! current experiment phase. Around that core it provides the run loop, the
//! scheduler that controllers talk to, and the CSV export of a finished
//! experiment.
//!
//! # Modules
//!
//! - [`arena`] -- Square arena geometry: movement, placement, and encounters.
//! - [`config`] -- Configuration loading from `tomsim.yaml` into
//!   strongly-typed structs, with environment overrides.
//! - [`events`] -- Change notifications ([`SimulationEvent`]) and the
//!   broadcast bus.
//! - [`experiment`] -- Phase transitions, survival checks, and replacement.
//! - [`export`] -- The results CSV.
//! - [`operator`] -- Pause, resume, speed, and stop control state.
//! - [`population`] -- Agent storage and negotiation bookkeeping.
//! - [`runner`] -- The async run loop.
//! - [`scheduler`] -- [`Scheduler`]: the loop task plus controller commands.
//! - [`stats`] -- Population history and per-pair negotiation statistics.
//! - [`tick`] -- [`Simulation`] and the per-tick cycle.
//!
//! [`SimulationEvent`]: events::SimulationEvent
//! [`Scheduler`]: scheduler::Scheduler
//! [`Simulation`]: tick::Simulation

pub mod arena;
pub mod config;
pub mod events;
pub mod experiment;
pub mod export;
pub mod operator;
pub mod population;
pub mod runner;
pub mod scheduler;
pub mod stats;
pub mod tick;

pub use config::SimulationConfig;
pub use events::{EventBus, SimulationEvent};
pub use scheduler::{Scheduler, SchedulerError};
pub use tick::{Simulation, TickSummary};
