use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe, not named in any spec.md Non-goal (an
/// ambient concern, per SPEC_FULL.md §6).
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let auth = state.chat.get_auth_state().await;
    Json(json!({
        "status": "ok",
        "chat_ready": auth.is_authorized,
        "queue_in_flight": state.queue.in_flight_count(),
    }))
}
