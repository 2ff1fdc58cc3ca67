use std::sync::Arc;

use receipt_chat::{ChatMessage, ChatSession};
use receipt_core::types::ChatKind;
use receipt_store::TransactionStore;
use tracing::{error, warn};

use crate::filter::should_process;
use crate::monitor::MonitorRegistry;
use crate::queue::WorkQueue;

/// Live push producer: drains the chat session's inbound-message channel
/// and enqueues messages that pass the monitor row's filter.
pub async fn run_live_capture(
    session: Arc<ChatSession>,
    registry: Arc<MonitorRegistry>,
    store: Arc<TransactionStore>,
    queue: Arc<WorkQueue>,
) {
    let mut rx = session.add_new_message_handler().await;
    while let Some(message) = rx.recv().await {
        handle_inbound(&registry, &store, &queue, message).await;
    }
}

async fn handle_inbound(
    registry: &MonitorRegistry,
    store: &TransactionStore,
    queue: &WorkQueue,
    message: ChatMessage,
) {
    let monitor = match registry.get(message.chat_id) {
        Ok(Some(m)) if m.enabled => m,
        Ok(_) => return,
        Err(e) => {
            warn!(chat_id = %message.chat_id, error = %e, "monitor lookup failed");
            return;
        }
    };

    let chat_kind = chat_kind_from_type(&monitor.chat_type);
    let passes = should_process(
        &message.text,
        message.document.is_some(),
        chat_kind,
        &monitor,
    );
    if !passes {
        return;
    }

    match store.address_exists(message.chat_id, message.id) {
        Ok(true) => return,
        Ok(false) => {}
        Err(e) => {
            error!(chat_id = %message.chat_id, error = %e, "address probe failed, enqueueing anyway");
        }
    }

    queue.enqueue(message.chat_id, message.id).await;
}

fn chat_kind_from_type(raw: &str) -> ChatKind {
    match raw {
        "bot" => ChatKind::Bot,
        "group" => ChatKind::Group,
        "supergroup" => ChatKind::Supergroup,
        "channel" => ChatKind::Channel,
        _ => ChatKind::User,
    }
}
