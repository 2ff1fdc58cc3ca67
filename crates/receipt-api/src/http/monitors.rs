use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use receipt_capture::MonitoredChat;
use receipt_core::types::{ChatId, FilterMode};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct MonitoredChatView {
    pub chat_id: i64,
    pub enabled: bool,
    pub last_processed_message_id: i64,
    pub chat_type: String,
    pub filter_mode: String,
    pub filter_keywords: Option<String>,
    pub chat_title: Option<String>,
    pub last_error: Option<String>,
}

impl From<MonitoredChat> for MonitoredChatView {
    fn from(m: MonitoredChat) -> Self {
        Self {
            chat_id: m.chat_id.0,
            enabled: m.enabled,
            last_processed_message_id: m.last_processed_message_id,
            chat_type: m.chat_type,
            filter_mode: m.filter_mode.to_string(),
            filter_keywords: m.filter_keywords,
            chat_title: m.chat_title,
            last_error: m.last_error,
        }
    }
}

/// GET /monitors — list every watched conversation, enabled or not.
pub async fn list_monitors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MonitoredChatView>>, ApiError> {
    let rows = state.monitors.list_all()?;
    Ok(Json(rows.into_iter().map(MonitoredChatView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpsertMonitorRequest {
    pub enabled: bool,
    #[serde(default)]
    pub start_from_latest: bool,
    #[serde(default)]
    pub filter_mode: Option<String>,
    #[serde(default)]
    pub filter_keywords: Option<String>,
}

/// PUT /monitors/{chat_id} — create or update monitor state (spec §4.2's
/// `upsert`). When `enabled && start_from_latest`, the registry seeds
/// `last_processed_message_id` from the chat's current head so catch-up
/// does not replay history.
pub async fn upsert_monitor(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
    Json(req): Json<UpsertMonitorRequest>,
) -> Result<Json<MonitoredChatView>, ApiError> {
    let filter_mode: FilterMode = match &req.filter_mode {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("unknown filter_mode: {raw}")))?,
        None => FilterMode::All,
    };

    let monitor = state
        .monitors
        .upsert(
            state.chat.as_ref(),
            ChatId(chat_id),
            req.enabled,
            filter_mode,
            req.filter_keywords,
            req.start_from_latest,
        )
        .await?;
    Ok(Json(monitor.into()))
}

#[derive(Debug, Serialize)]
pub struct MonitorStatusResponse {
    pub running: bool,
    pub queue_size: usize,
    pub workers: usize,
}

/// GET /monitor/status — liveness of the capture/worker subsystem.
pub async fn monitor_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatusResponse> {
    Json(MonitorStatusResponse {
        running: true,
        queue_size: state.queue.in_flight_count(),
        workers: state.config.pipeline.workers,
    })
}
