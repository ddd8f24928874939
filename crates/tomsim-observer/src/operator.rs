//! Operator REST API handlers for runtime simulation control.
//!
//! These endpoints forward the controller commands to the [`Scheduler`]
//! and refresh the snapshot once the command has completed, so a
//! following read sees its effect.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/operator/new-run` | Discard the run and build a fresh one |
//! | `POST` | `/api/operator/start` | Resume the tick loop |
//! | `POST` | `/api/operator/pause` | Pause the tick loop |
//! | `POST` | `/api/operator/begin-experiment` | Enter the initialization phase |
//! | `POST` | `/api/operator/speed` | Set tick interval (ms) |
//! | `GET` | `/api/operator/status` | Current loop status |
//!
//! [`Scheduler`]: tomsim_core::Scheduler

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use tomsim_core::Scheduler;
use tomsim_core::operator::MAX_TICK_INTERVAL_MS;
use tracing::info;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/operator/speed`.
#[derive(Debug, serde::Deserialize)]
pub struct SetSpeedRequest {
    /// New tick interval in milliseconds. Zero runs ticks back to back.
    pub tick_interval_ms: u64,
}

/// Generic command response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the command changed anything.
    changed: bool,
    /// Human-readable message.
    message: String,
}

fn scheduler(state: &AppState) -> Result<&Arc<Scheduler>, ObserverError> {
    state
        .scheduler
        .as_ref()
        .ok_or(ObserverError::SchedulerUnavailable)
}

fn respond(changed: bool, message: &str) -> Json<OperatorResponse> {
    Json(OperatorResponse {
        changed,
        message: message.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Stop the current run and build a fresh, paused one.
pub async fn new_run(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    scheduler(&state)?.new_run().await?;
    state.refresh().await;
    info!("new run requested by operator");
    Ok(respond(true, "New run created"))
}

/// Resume the tick loop.
pub async fn start(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let changed = scheduler(&state)?.start();
    Ok(respond(
        changed,
        if changed { "Simulation started" } else { "Simulation already running" },
    ))
}

/// Pause the tick loop at the next tick boundary.
pub async fn pause(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let changed = scheduler(&state)?.pause();
    state.refresh().await;
    Ok(respond(
        changed,
        if changed { "Simulation paused" } else { "Simulation already paused" },
    ))
}

/// Enter the initialization phase and start the loop.
pub async fn begin_experiment(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let changed = scheduler(&state)?.begin_experiment().await;
    state.refresh().await;
    Ok(respond(
        changed,
        if changed {
            "Initialization phase started"
        } else {
            "Experiment already begun"
        },
    ))
}

/// Change the tick interval at runtime.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetSpeedRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let previous = scheduler(&state)?
        .set_speed(body.tick_interval_ms)
        .ok()
        .ok_or_else(|| {
            ObserverError::InvalidQuery(format!(
                "tick_interval_ms must be at most {MAX_TICK_INTERVAL_MS}"
            ))
        })?;

    Ok(Json(serde_json::json!({
        "changed": previous != body.tick_interval_ms,
        "message": format!("Tick interval changed from {previous}ms to {}ms", body.tick_interval_ms),
        "previous_interval_ms": previous,
        "new_interval_ms": body.tick_interval_ms,
    })))
}

/// Return loop status: tick, phase, pause state, speed, and counts.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let status = scheduler(&state)?.operator_status().await;
    Ok(Json(status))
}
