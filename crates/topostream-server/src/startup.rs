//! Background startup helper.
//!
//! Provides [`spawn_server`] which launches the HTTP + `WebSocket` server
//! on a background Tokio task so the caller can keep feeding backend
//! notifications into the engine.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::server::{listen_addr, start_server};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the server on a background Tokio task.
///
/// The address is validated before the task is spawned; binding happens
/// inside the task and a failure there is logged. The caller should hold
/// the returned handle and abort or await it during shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the configured address is invalid.
pub fn spawn_server(
    config: ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = listen_addr(&config)?;

    let handle = tokio::spawn(async move {
        if let Err(e) = start_server(&config, state).await {
            tracing::error!(error = %e, "Topology stream server exited with error");
        }
    });

    tracing::info!(%addr, "Topology stream server spawned on background task");

    Ok(handle)
}
