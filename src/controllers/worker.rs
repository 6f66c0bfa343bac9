//! Worker loop pulling keys from the work queue

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::Result;
use crate::metrics;
use crate::queue::WorkQueue;

use super::Dispatcher;

/// Process keys until the queue shuts down
pub async fn run_worker(queue: WorkQueue, dispatcher: Arc<Dispatcher>) {
    while let Some(key) = queue.get().await {
        let result = dispatcher.process_queue_item(&key).await;
        handle_result(&queue, &key, result);
        queue.done(&key);
    }
    debug!("Worker stopped");
}

fn handle_result(queue: &WorkQueue, key: &str, result: Result<()>) {
    metrics::QUEUE_ITEMS_PROCESSED.inc();

    match result {
        Ok(()) => queue.forget(key),
        Err(e) if !e.is_retryable() => {
            error!(key = %key, error = %e, "Error processing queue item, dropping");
            queue.forget(key);
        }
        Err(e) => {
            error!(
                key = %key,
                error = %e,
                requeues = queue.num_requeues(key),
                "Error processing queue item, requeuing"
            );
            metrics::QUEUE_ITEMS_REQUEUED.inc();
            queue.add_rate_limited(key);
        }
    }
}
