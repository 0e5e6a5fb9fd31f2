use crate::interface_adapters::protocol::QueueStatsDto;
use crate::interface_adapters::state::AppState;

use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// Latest queue counters, as published by the tick worker after each tick.
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Copy out of the watch slot so no borrow is held while responding.
    let stats = *state.stats_tx.borrow();
    Json(QueueStatsDto::from(stats))
}
