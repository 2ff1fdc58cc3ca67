use std::collections::HashSet;
use std::sync::Mutex;

use receipt_core::types::{ChatId, MessageId};
use tokio::sync::mpsc;

/// A single unit of work: one candidate message address.
pub type WorkItem = (ChatId, MessageId);

/// Bounded FIFO of `(chat_id, message_id)` tuples plus an in-memory
/// in-flight set guarding against two producers racing the same message.
/// Not a durability boundary — durability comes from the ProcessingTask
/// table and its unique index (§4.4).
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
    in_flight: Mutex<HashSet<WorkItem>>,
}

pub struct WorkQueueReceiver {
    pub rx: mpsc::Receiver<WorkItem>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> (std::sync::Arc<Self>, WorkQueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            std::sync::Arc::new(Self {
                tx,
                in_flight: Mutex::new(HashSet::new()),
            }),
            WorkQueueReceiver { rx },
        )
    }

    /// No-op if the tuple is already in-flight. Callers are expected to
    /// have already checked the transaction store's cheap address probe
    /// before calling this (§4.4).
    pub async fn enqueue(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        let item = (chat_id, message_id);
        {
            let mut guard = self.in_flight.lock().expect("work queue mutex poisoned");
            if !guard.insert(item) {
                return false;
            }
        }
        if self.tx.send(item).await.is_err() {
            self.in_flight
                .lock()
                .expect("work queue mutex poisoned")
                .remove(&item);
            return false;
        }
        true
    }

    pub fn is_in_flight(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        self.in_flight
            .lock()
            .expect("work queue mutex poisoned")
            .contains(&(chat_id, message_id))
    }

    /// Removes the tuple from the in-flight set regardless of how the
    /// worker's processing ended (success or failure).
    pub fn complete(&self, chat_id: ChatId, message_id: MessageId) {
        self.in_flight
            .lock()
            .expect("work queue mutex poisoned")
            .remove(&(chat_id, message_id));
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().expect("work queue mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_enqueue_is_noop() {
        let (queue, _rx) = WorkQueue::new(16);
        let chat = ChatId(1);
        let msg = MessageId(1);
        assert!(queue.enqueue(chat, msg).await);
        assert!(!queue.enqueue(chat, msg).await);
        queue.complete(chat, msg);
        assert!(queue.enqueue(chat, msg).await);
    }
}
