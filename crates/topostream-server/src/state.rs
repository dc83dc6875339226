//! Shared application state for the streaming server.

use std::sync::Arc;

use crate::config::StreamConfig;
use crate::engine::BroadcastEngine;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// The broadcast engine every connection talks to.
    pub engine: Arc<BroadcastEngine>,
    /// Per-connection streaming limits.
    pub stream: StreamConfig,
}

impl AppState {
    /// Create the application state around an engine.
    pub const fn new(engine: Arc<BroadcastEngine>, stream: StreamConfig) -> Self {
        Self { engine, stream }
    }
}
