//! DeleteBackupRequest controller
//!
//! Watches DeleteBackupRequest resources, queues them for processing and
//! runs the workers, the resync ticker and the expiry sweeper.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{reflector, watcher, WatchStreamExt},
    Api, Client,
};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::RequestStore;
use crate::controllers::Context;
use crate::crd::DeleteBackupRequest;
use crate::error::{Error, Result};
use crate::metrics;
use crate::queue::WorkQueue;
use crate::reconcilers::{ExpirySweeper, RequestProcessor};

use super::{queue_key, run_worker, Dispatcher};

/// Workers, resync and expiry wired around one work queue
pub struct BackupDeletionController {
    queue: WorkQueue,
    store: Arc<dyn RequestStore>,
    dispatcher: Arc<Dispatcher>,
    sweeper: ExpirySweeper,
    workers: usize,
    resync_interval: Duration,
    gc_interval: Duration,
}

impl BackupDeletionController {
    /// Build a controller processing requests from `store`
    pub fn new(ctx: &Context, store: Arc<dyn RequestStore>) -> Result<Self> {
        let processor = Arc::new(RequestProcessor::new(
            ctx.cluster.clone(),
            ctx.backup_service.clone(),
            ctx.snapshot_service.clone(),
            ctx.config.backup_bucket.clone(),
        ));

        Self::with_dispatcher(
            ctx,
            store.clone(),
            Arc::new(Dispatcher::new(store, processor)),
        )
    }

    /// Build a controller around an existing dispatcher
    pub fn with_dispatcher(
        ctx: &Context,
        store: Arc<dyn RequestStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        let sweeper = ExpirySweeper::new(
            ctx.cluster.clone(),
            store.clone(),
            ctx.clock.clone(),
            ctx.config.max_request_age,
        )?;

        Ok(Self {
            queue: WorkQueue::new(),
            store,
            dispatcher,
            sweeper,
            workers: ctx.config.workers.max(1),
            resync_interval: ctx.config.resync_interval,
            gc_interval: ctx.config.gc_interval,
        })
    }

    /// The controller's work queue
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Queue a request for processing
    pub fn enqueue(&self, req: &DeleteBackupRequest) {
        self.queue.add(queue_key(req));
    }

    /// Queue every request currently in the mirror
    pub fn resync(&self) {
        let requests = self.store.list();
        debug!(count = requests.len(), "Resyncing DeleteBackupRequests");
        for req in requests {
            self.enqueue(&req);
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// On cancellation the queue stops handing out keys, in-flight items are
    /// allowed to finish and the workers are joined before returning.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(workers = self.workers, "Starting BackupDeletion controller");

        let mut workers = JoinSet::new();
        for _ in 0..self.workers {
            workers.spawn(run_worker(self.queue.clone(), self.dispatcher.clone()));
        }

        let stop_workers = async {
            shutdown.cancelled().await;
            info!("Shutting down BackupDeletion controller");
            self.queue.shut_down();
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Worker exited abnormally");
                }
            }
        };

        tokio::join!(
            self.resync_loop(shutdown.clone()),
            self.gc_loop(shutdown.clone()),
            stop_workers,
        );

        info!("BackupDeletion controller stopped");
    }

    async fn resync_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.resync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The change feed delivers the initial state; skip the immediate tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.resync(),
            }
        }
    }

    async fn gc_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.gc_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let deleted = self.sweeper.sweep().await;
                    if deleted > 0 {
                        info!(deleted, "Deleted expired DeleteBackupRequests");
                    }
                }
            }
        }
    }
}

/// Run the DeleteBackupRequest controller against the cluster
pub async fn run(client: Client, context: Arc<Context>, shutdown: CancellationToken) -> Result<()> {
    let api: Api<DeleteBackupRequest> = match &context.config.namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("DeleteBackupRequest CRD not installed: {}", e);
        return Err(e.into());
    }

    let (reader, writer) = reflector::store();
    let controller = BackupDeletionController::new(&context, Arc::new(reader.clone()))?;

    let queue = controller.queue().clone();
    let feed_shutdown = shutdown.clone();
    let feed = tokio::spawn(async move {
        let mut events = pin!(watcher(api, watcher::Config::default())
            .default_backoff()
            .reflect(writer));

        while let Some(event) = events.next().await {
            handle_feed_item(&queue, event);
        }

        error!("DeleteBackupRequest watch ended unexpectedly");
        feed_shutdown.cancel();
    });

    tokio::select! {
        ready = reader.wait_until_ready() => {
            if let Err(e) = ready {
                feed.abort();
                return Err(Error::watch(format!(
                    "DeleteBackupRequest cache never became ready: {}",
                    e
                )));
            }
            info!("DeleteBackupRequest cache synced");
            controller.run(shutdown.clone()).await;
        }
        _ = shutdown.cancelled() => {}
    }

    feed.abort();
    Ok(())
}

/// Record watch health and queue changed requests.
///
/// Any successful event, including the markers of a relist, means the watch
/// is healthy again.
fn handle_feed_item<E: fmt::Display>(
    queue: &WorkQueue,
    item: std::result::Result<watcher::Event<DeleteBackupRequest>, E>,
) {
    match item {
        Ok(event) => {
            metrics::CONTROLLER_HEALTH.set(1.0);
            match event {
                watcher::Event::Apply(req) | watcher::Event::InitApply(req) => {
                    queue.add(queue_key(&req));
                }
                _ => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "DeleteBackupRequest watch error");
            metrics::CONTROLLER_HEALTH.set(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::new_delete_backup_request;

    fn request(name: &str) -> DeleteBackupRequest {
        let mut req = new_delete_backup_request("foo", "uid");
        req.metadata.namespace = Some("heptio-ark".to_string());
        req.metadata.name = Some(name.to_string());
        req
    }

    #[test]
    fn relist_restores_health_after_watch_error() {
        let queue = WorkQueue::new();

        handle_feed_item::<String>(&queue, Err("410 Gone".to_string()));
        assert_eq!(metrics::CONTROLLER_HEALTH.get(), 0.0);

        // An empty relist yields no objects, only the init markers.
        handle_feed_item::<String>(&queue, Ok(watcher::Event::Init));
        assert_eq!(metrics::CONTROLLER_HEALTH.get(), 1.0);

        handle_feed_item::<String>(&queue, Err("connection reset".to_string()));
        handle_feed_item::<String>(&queue, Ok(watcher::Event::InitDone));
        assert_eq!(metrics::CONTROLLER_HEALTH.get(), 1.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn applied_requests_are_queued_and_deletes_ignored() {
        let queue = WorkQueue::new();

        handle_feed_item::<String>(&queue, Ok(watcher::Event::InitApply(request("a"))));
        handle_feed_item::<String>(&queue, Ok(watcher::Event::Apply(request("b"))));
        handle_feed_item::<String>(&queue, Ok(watcher::Event::Delete(request("c"))));

        assert_eq!(queue.len(), 2);
    }
}
