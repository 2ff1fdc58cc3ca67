use std::sync::Arc;

use receipt_capture::queue::WorkQueueReceiver;
use receipt_capture::{MonitorRegistry, WorkQueue};
use tracing::{error, info};

use crate::pipeline::Pipeline;

/// Drains the capture layer's work queue with a bounded pool of worker
/// tasks (default `PipelineConfig::workers`, §4.4).
pub async fn run_worker_pool(
    pipeline: Arc<Pipeline>,
    monitors: Arc<MonitorRegistry>,
    queue: Arc<WorkQueue>,
    receiver: WorkQueueReceiver,
    worker_count: usize,
) {
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
    let mut handles = Vec::with_capacity(worker_count.max(1));

    for worker_id in 0..worker_count.max(1) {
        let pipeline = Arc::clone(&pipeline);
        let monitors = Arc::clone(&monitors);
        let queue = Arc::clone(&queue);
        let receiver = Arc::clone(&receiver);

        handles.push(tokio::spawn(async move {
            loop {
                let item = {
                    let mut guard = receiver.lock().await;
                    guard.rx.recv().await
                };
                let Some((chat_id, message_id)) = item else {
                    info!(worker_id, "work queue closed, worker exiting");
                    return;
                };

                let outcome = pipeline.process_one(chat_id, message_id).await;
                let (advance, error_text) = match &outcome {
                    Ok(_) => (true, None),
                    Err(e) => (e.is_permanent(), Some(e.to_string())),
                };

                if let Err(e) =
                    monitors.advance_cursor(chat_id, message_id, error_text.as_deref(), advance)
                {
                    error!(%chat_id, %message_id, error = %e, "failed to update monitor cursor");
                }

                if let Err(e) = &outcome {
                    error!(%chat_id, %message_id, error = %e, "pipeline failed");
                }

                queue.complete(chat_id, message_id);
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}
