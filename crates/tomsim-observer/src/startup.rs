//! Observer server startup helper for embedding in the engine.
//!
//! Provides [`spawn_observer`], which binds the Observer HTTP + `WebSocket`
//! server and runs it on a background Tokio task alongside the simulation
//! loop.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the Observer server and serve it on a background Tokio task.
///
/// The bind happens before the task is spawned, so an address already in
/// use is reported to the caller instead of being logged from the task.
/// The caller should hold the returned handle and abort it on shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address is invalid or cannot
/// be bound.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(host = %config.host, port = config.port, "Observer server spawned on background task");

    Ok(handle)
}
