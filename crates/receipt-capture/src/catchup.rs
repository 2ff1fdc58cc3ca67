use std::sync::Arc;
use std::time::Duration;

use receipt_chat::ChatSession;
use receipt_core::types::MessageId;
use receipt_store::TransactionStore;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::filter::should_process;
use crate::monitor::{MonitorRegistry, MonitoredChat};
use crate::queue::WorkQueue;

const CATCHUP_BATCH_SIZE: usize = 100;
const CATCHUP_BATCH_CAP: usize = 50;

/// Periodic catch-up loop: a `tokio::time::interval`-driven loop selecting
/// against a `watch::Receiver<bool>` shutdown signal, sweeping every
/// enabled monitored chat past its cursor each tick.
pub async fn run_catchup_loop(
    session: Arc<ChatSession>,
    registry: Arc<MonitorRegistry>,
    store: Arc<TransactionStore>,
    queue: Arc<WorkQueue>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_once(&session, &registry, &store, &queue).await {
                    warn!(error = %e, "catch-up iteration failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("catch-up loop shutting down");
                    return;
                }
            }
        }
    }
}

async fn run_once(
    session: &ChatSession,
    registry: &MonitorRegistry,
    store: &TransactionStore,
    queue: &WorkQueue,
) -> Result<(), crate::error::CaptureError> {
    for monitor in registry.list_enabled()? {
        if let Err(e) = catchup_one(session, store, queue, &monitor).await {
            warn!(chat_id = %monitor.chat_id, error = %e, "catch-up failed for chat");
        }
    }
    Ok(())
}

/// Pulls history older than the recorded cursor in descending batches of
/// 100, collecting ids `> last_processed_message_id` that pass the filter,
/// stopping on a short batch, the cursor, or a 50-batch safety cap. Then
/// enqueues collected ids in ascending order, skipping any address the
/// store already holds a transaction for (§4.4's cheap probe).
async fn catchup_one(
    session: &ChatSession,
    store: &TransactionStore,
    queue: &WorkQueue,
    monitor: &MonitoredChat,
) -> Result<(), crate::error::CaptureError> {
    let cursor = monitor.last_processed_message_id;
    let mut collected: Vec<MessageId> = Vec::new();
    let mut from_id: Option<MessageId> = None;

    for _ in 0..CATCHUP_BATCH_CAP {
        let batch = session
            .get_messages(monitor.chat_id, from_id, CATCHUP_BATCH_SIZE, false)
            .await
            .map_err(|e| crate::error::CaptureError::Chat(e.to_string()))?;

        if batch.is_empty() {
            break;
        }

        let oldest_id = batch.last().map(|m| m.id.0).unwrap_or(0);
        let chat_kind = chat_kind_from_type(&monitor.chat_type);

        for message in &batch {
            if message.id.0 <= cursor {
                continue;
            }
            let passes = should_process(
                &message.text,
                message.document.is_some(),
                chat_kind,
                monitor,
            );
            if passes {
                collected.push(message.id);
            }
        }

        let short_batch = batch.len() < CATCHUP_BATCH_SIZE;
        from_id = Some(MessageId(oldest_id));

        if short_batch || oldest_id <= cursor {
            break;
        }
    }

    collected.sort_by_key(|m| m.0);
    for message_id in collected {
        if store
            .address_exists(monitor.chat_id, message_id)
            .map_err(|e| crate::error::CaptureError::Store(e.to_string()))?
        {
            continue;
        }
        queue.enqueue(monitor.chat_id, message_id).await;
    }

    Ok(())
}

fn chat_kind_from_type(raw: &str) -> receipt_core::types::ChatKind {
    use receipt_core::types::ChatKind;
    match raw {
        "bot" => ChatKind::Bot,
        "group" => ChatKind::Group,
        "supergroup" => ChatKind::Supergroup,
        "channel" => ChatKind::Channel,
        _ => ChatKind::User,
    }
}
