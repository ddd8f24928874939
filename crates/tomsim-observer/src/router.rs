//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS and request tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/events` -- `WebSocket` event stream
/// - `GET /api/status`, `/api/agents`, `/api/agents/{id}`, `/api/population`
/// - `POST /api/operator/{new-run,start,pause,begin-experiment,speed}`
/// - `GET /api/operator/status`
///
/// CORS allows any origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/events", get(ws::ws_events))
        // REST API
        .route("/api/status", get(handlers::get_status))
        .route("/api/agents", get(handlers::list_agents))
        .route("/api/agents/{id}", get(handlers::get_agent))
        .route("/api/population", get(handlers::get_population))
        // Operator
        .route("/api/operator/new-run", post(operator::new_run))
        .route("/api/operator/start", post(operator::start))
        .route("/api/operator/pause", post(operator::pause))
        .route("/api/operator/begin-experiment", post(operator::begin_experiment))
        .route("/api/operator/speed", post(operator::set_speed))
        .route("/api/operator/status", get(operator::status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
