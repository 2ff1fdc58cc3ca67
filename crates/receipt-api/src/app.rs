use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use receipt_capture::{MonitorRegistry, WorkQueue};
use receipt_chat::ChatSession;
use receipt_core::config::AppConfig;
use receipt_store::TransactionStore;
use receipt_worker::Pipeline;

/// Central shared state, passed as `Arc<AppState>` to every Axum handler.
/// One struct holding every subsystem the pipeline needs: chat transport,
/// storage, monitor registry, work queue, and the pipeline itself.
pub struct AppState {
    pub config: AppConfig,
    pub chat: Arc<ChatSession>,
    pub store: Arc<TransactionStore>,
    pub monitors: Arc<MonitorRegistry>,
    pub queue: Arc<WorkQueue>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        chat: Arc<ChatSession>,
        store: Arc<TransactionStore>,
        monitors: Arc<MonitorRegistry>,
        queue: Arc<WorkQueue>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        Self {
            config,
            chat,
            store,
            monitors,
            queue,
            pipeline,
        }
    }
}

/// Assemble the full Axum router: the §6 contract endpoints plus the
/// ambient `/health` liveness probe (§6's "supplemented ambient
/// surface" note).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/process-receipt",
            post(crate::http::receipts::process_receipt),
        )
        .route(
            "/process-receipt-batch",
            post(crate::http::receipts::process_receipt_batch),
        )
        .route(
            "/processed-status",
            get(crate::http::receipts::processed_status),
        )
        .route(
            "/monitors",
            get(crate::http::monitors::list_monitors),
        )
        .route(
            "/monitors/{chat_id}",
            put(crate::http::monitors::upsert_monitor),
        )
        .route(
            "/monitor/status",
            get(crate::http::monitors::monitor_status),
        )
        .route("/auth/phone", post(crate::http::auth::set_phone))
        .route("/auth/code", post(crate::http::auth::check_code))
        .route("/auth/password", post(crate::http::auth::check_password))
        .route("/auth/resend", post(crate::http::auth::resend_code))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
