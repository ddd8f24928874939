//! Engine binary for the ToM negotiation simulation.
//!
//! This is the entry point that wires together configuration, the
//! scheduler, and the observer API.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Parse flags and load configuration (`tomsim.yaml`, `TOMSIM_*`, flags)
//! 3. Build the first run and spawn the scheduler's loop, parked
//! 4. Headless: begin the experiment, wait for it to finish, shut down
//! 5. Interactive: serve the observer API and wait for Ctrl-C

mod cli;
mod error;
mod observer_callback;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::RwLock;
use tomsim_core::runner::NoOpCallback;
use tomsim_core::{Scheduler, Simulation, SimulationConfig};
use tomsim_observer::{AppState, ServerConfig, SimulationSnapshot};
use tomsim_types::{ExperimentPhase, RunState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::error::EngineError;
use crate::observer_callback::ObserverCallback;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is unusable, the observer cannot
/// bind, or the run loop fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("tomsim starting");

    // 2. Load configuration.
    let args = Args::parse();
    let config = cli::load_config(&args)?;
    info!(
        variant = ?config.experiment.variant,
        seed = ?config.experiment.seed,
        headless = config.runner.headless,
        results = %config.export.path().display(),
        "Configuration loaded"
    );

    if config.runner.headless {
        run_headless(config).await?;
    } else {
        run_interactive(config).await?;
    }

    info!("tomsim shutdown complete");
    Ok(())
}

/// Run one experiment start to finish with no observer.
async fn run_headless(config: SimulationConfig) -> Result<(), EngineError> {
    let scheduler = Scheduler::spawn(config, Box::new(NoOpCallback));

    scheduler.begin_experiment().await;
    scheduler.wait_for_phase(ExperimentPhase::Finished).await?;
    let result = scheduler.shutdown().await?;

    let export = scheduler
        .simulation()
        .lock()
        .await
        .last_export()
        .map(|path| path.display().to_string());
    info!(
        total_ticks = ?result.as_ref().map(|r| r.total_ticks),
        export = ?export,
        "Headless run finished"
    );
    Ok(())
}

/// Park the run and hand control to the observer API until Ctrl-C.
async fn run_interactive(config: SimulationConfig) -> Result<(), EngineError> {
    let server_config = ServerConfig {
        host: config.observer.host.clone(),
        port: config.observer.port,
    };
    let observer_enabled = config.observer.enabled;

    // 3. Build the first run, sharing its snapshot with the tick callback.
    let simulation = Simulation::new(config.clone());
    let snapshot = Arc::new(RwLock::new(SimulationSnapshot::capture(
        &simulation,
        RunState::Paused,
    )));
    let callback = ObserverCallback::new(Arc::clone(&snapshot));
    let scheduler = Arc::new(Scheduler::with_simulation(
        config,
        simulation,
        Box::new(callback),
    ));

    // 4. Start the observer, or run unattended without one.
    let observer = if observer_enabled {
        let state = Arc::new(AppState::attached(snapshot, Arc::clone(&scheduler)));
        let handle = tomsim_observer::spawn_observer(&server_config, state).await?;
        info!(port = server_config.port, "Observer API server started, waiting for commands");
        Some(handle)
    } else {
        warn!("Observer disabled; beginning the experiment unattended");
        scheduler.begin_experiment().await;
        None
    };

    // 5. Run until interrupted.
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");

    if let Some(handle) = observer {
        handle.abort();
    }
    if let Some(result) = scheduler.shutdown().await? {
        info!(
            end_reason = ?result.end_reason,
            total_ticks = result.total_ticks,
            "Run loop stopped"
        );
    }
    Ok(())
}
