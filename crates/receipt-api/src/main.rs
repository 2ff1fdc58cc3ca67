use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use receipt_capture::{MonitorRegistry, WorkQueue};
use receipt_chat::ChatSession;
use receipt_core::config::AppConfig;
use receipt_core::time::parse_zone;
use receipt_parsing::llm::{LlmProvider, OpenAiCompatClient};
use receipt_resolver::OperatorResolver;
use receipt_store::TransactionStore;
use receipt_worker::Pipeline;

mod app;
mod error;
mod http;

/// Bounded work-queue capacity (§4.4: "bounded FIFO"). Chosen generous
/// enough that catch-up's 50-batch sweep over a busy chat never blocks on
/// a full queue before a worker drains it.
const WORK_QUEUE_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "receipt_api=info,receipt_worker=info,tower_http=debug".into()),
        )
        .init();

    // Config: explicit path > RECEIPT_CONFIG env > defaults + RECEIPT_* env
    // overrides. Missing credentials are a startup failure per §7 — there
    // is no fallback-to-defaults here.
    let config_path = std::env::var("RECEIPT_CONFIG").ok();
    let config = AppConfig::load(config_path.as_deref())
        .context("failed to load configuration (RECEIPT_CHAT__API_ID / RECEIPT_CHAT__API_HASH / RECEIPT_DATABASE__URL required)")?;

    let zone = parse_zone(&config.pipeline.timezone)
        .with_context(|| format!("unknown timezone: {}", config.pipeline.timezone))?;

    // ---- storage -----------------------------------------------------------
    let database_path = expand_home(&config.database.url);
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = Arc::new(TransactionStore::new(open_conn(&database_path)?)?);
    let monitors = Arc::new(MonitorRegistry::new(open_conn(&database_path)?)?);
    let resolver = Arc::new(OperatorResolver::new(
        open_conn(&database_path)?,
        config.pipeline.resolver_confidence_threshold,
    )?);

    // ---- chat session --------------------------------------------------
    let session_dir = expand_home(&config.chat.session_dir);
    std::fs::create_dir_all(&session_dir).ok();
    let chat = Arc::new(ChatSession::new(
        config.chat.api_id,
        config.chat.api_hash.clone(),
        session_dir.join("session"),
    ));
    chat.connect_with_backoff()
        .await
        .context("failed to establish chat session")?;

    // ---- model (optional: absence disables model-text/vision fallback) ----
    let model: Option<Arc<dyn LlmProvider>> = config.model.api_key.as_ref().map(|key| {
        Arc::new(OpenAiCompatClient::new(
            key.clone(),
            config.model.base_url.clone(),
            config.model.text_model.clone(),
            config.model.vision_model.clone(),
        )) as Arc<dyn LlmProvider>
    });
    if model.is_none() {
        warn!("no model API key configured: model-text and model-vision fallbacks are disabled");
    }

    // ---- work queue + pipeline ----------------------------------------
    let (queue, receiver) = WorkQueue::new(WORK_QUEUE_CAPACITY);
    let pipeline = Arc::new(Pipeline {
        chat: chat.clone(),
        store: store.clone(),
        resolver: resolver.clone(),
        model,
        renderer: None,
        ocr: None,
        zone,
        text_confidence_threshold: config.pipeline.text_confidence_threshold,
    });

    // ---- capture layer: live push + periodic catch-up ------------------
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(receipt_capture::live::run_live_capture(
        chat.clone(),
        monitors.clone(),
        store.clone(),
        queue.clone(),
    ));
    tokio::spawn(receipt_capture::catchup::run_catchup_loop(
        chat.clone(),
        monitors.clone(),
        store.clone(),
        queue.clone(),
        config.pipeline.catchup_interval(),
        shutdown_rx,
    ));
    tokio::spawn(receipt_worker::run_worker_pool(
        pipeline.clone(),
        monitors.clone(),
        queue.clone(),
        receiver,
        config.pipeline.workers,
    ));

    // ---- HTTP surface ----------------------------------------------------
    let bind = std::env::var("RECEIPT_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let state = Arc::new(app::AppState::new(config, chat, store, monitors, queue, pipeline));
    let router = app::build_router(state);

    info!(%bind, "receipt-api listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    Ok(())
}

/// On Ctrl-C, stop the catch-up loop (§5's shutdown sequence: producers
/// stop enqueuing first). Workers keep draining the in-flight queue until
/// Axum finishes the graceful-shutdown drain of in-flight HTTP requests.
async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, stopping producers");
    let _ = shutdown_tx.send(true);
}

fn open_conn(path: &Path) -> anyhow::Result<rusqlite::Connection> {
    rusqlite::Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
