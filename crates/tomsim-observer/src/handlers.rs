//! REST API endpoint handlers for the Observer server.
//!
//! All handlers read from the in-memory [`SimulationSnapshot`] via the
//! shared [`AppState`], so a slow client never holds up the tick loop.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/status` | Tick, phase, run state, counts, run id |
//! | `GET` | `/api/agents` | List agents (`?order=tom0\|tom1\|tom2`) |
//! | `GET` | `/api/agents/{id}` | Single agent |
//! | `GET` | `/api/population` | Current counts and recent history |
//!
//! [`SimulationSnapshot`]: crate::state::SimulationSnapshot

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use tomsim_types::{AgentId, ToMOrder};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/agents` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct AgentsQuery {
    /// Restrict the list to one order: `tom0`, `tom1`, or `tom2`.
    pub order: Option<String>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing the run status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let run_state = state.run_state().await;
    let snapshot = state.snapshot.read().await;
    let status = &snapshot.status;
    let tick = status.tick;
    let phase = status.phase;
    let variant = status.variant;
    let tom0 = status.counts.tom0;
    let tom1 = status.counts.tom1;
    let tom2 = status.counts.tom2;
    let negotiations = status.negotiations;
    let run_id = status.run_id;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>ToM Simulation Observer</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>ToM Simulation Observer</h1>
    <p class="subtitle">Run {run_id} -- {variant:?}</p>

    <p>Run state: <span class="status">{run_state:?}</span> &middot; Phase: <span class="status">{phase}</span></p>

    <div>
        <div class="metric">
            <div class="label">Tick</div>
            <div class="value">{tick}</div>
        </div>
        <div class="metric">
            <div class="label">ToM0</div>
            <div class="value">{tom0}</div>
        </div>
        <div class="metric">
            <div class="label">ToM1</div>
            <div class="value">{tom1}</div>
        </div>
        <div class="metric">
            <div class="label">ToM2</div>
            <div class="value">{tom2}</div>
        </div>
        <div class="metric">
            <div class="label">Negotiations</div>
            <div class="value">{negotiations}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/status">/api/status</a> -- Run status</li>
        <li>GET <a href="/api/agents">/api/agents</a> -- List agents (?order=tom0|tom1|tom2)</li>
        <li>GET /api/agents/{{id}} -- Single agent</li>
        <li>GET <a href="/api/population">/api/population</a> -- Counts and recent history</li>
        <li>GET <a href="/api/operator/status">/api/operator/status</a> -- Operator status</li>
        <li>POST /api/operator/{{new-run|start|pause|begin-experiment|speed}}</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws/events</code> -- Live event stream</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the run status. The run state is read live from the operator.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let run_state = state.run_state().await;
    let mut status = state.snapshot.read().await.status.clone();
    status.run_state = run_state;
    Json(status)
}

// ---------------------------------------------------------------------------
// GET /api/agents
// ---------------------------------------------------------------------------

/// List live agents, optionally restricted to one order.
///
/// # Query Parameters
///
/// - `order`: `tom0` | `tom1` | `tom2` (default: all orders)
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AgentsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let order = params.order.map(parse_order).transpose()?;
    let snapshot = state.snapshot.read().await;

    let agents: Vec<_> = snapshot
        .agents
        .iter()
        .filter(|agent| order.is_none_or(|order| agent.order == order))
        .collect();

    Ok(Json(serde_json::json!({
        "count": agents.len(),
        "agents": agents,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/agents/{id}
// ---------------------------------------------------------------------------

/// Return a single agent.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let agent_id = parse_agent_id(&id)?;
    let snapshot = state.snapshot.read().await;

    let agent = snapshot
        .agents
        .iter()
        .find(|agent| agent.id == agent_id)
        .ok_or_else(|| ObserverError::NotFound(format!("agent {agent_id}")))?;

    Ok(Json(serde_json::to_value(agent)?))
}

// ---------------------------------------------------------------------------
// GET /api/population
// ---------------------------------------------------------------------------

/// Return the current counts per order and the recent history rows.
pub async fn get_population(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(serde_json::json!({
        "tick": snapshot.status.tick,
        "phase": snapshot.status.phase,
        "counts": snapshot.status.counts,
        "history": snapshot.history,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_order(raw: String) -> Result<ToMOrder, ObserverError> {
    let message = format!("unknown order {raw:?}, expected tom0, tom1, or tom2");
    serde_json::from_value(serde_json::Value::String(raw))
        .ok()
        .ok_or(ObserverError::InvalidQuery(message))
}

fn parse_agent_id(raw: &str) -> Result<AgentId, ObserverError> {
    raw.parse::<u64>()
        .map(AgentId)
        .map_err(|e| ObserverError::InvalidQuery(format!("invalid agent id {raw:?}: {e}")))
}
