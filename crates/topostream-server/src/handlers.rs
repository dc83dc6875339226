//! REST handlers for the streaming server.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::engine::EngineStats;
use crate::state::AppState;

/// Report engine counters.
///
/// # Route
///
/// `GET /api/status`
pub async fn status(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats().await)
}
