//! Controller plumbing for DeleteBackupRequests
//!
//! Change events and periodic resyncs feed a [`WorkQueue`](crate::queue::WorkQueue);
//! workers hand each key to the [`Dispatcher`], which runs the deletion
//! workflow. An independent sweeper expires old processed requests.

mod backup_deletion_controller;
mod dispatcher;
mod worker;

pub use backup_deletion_controller::{run as run_backup_deletion_controller, BackupDeletionController};
pub use dispatcher::{queue_key, split_key, Dispatcher};
pub use worker::run_worker;

use std::sync::Arc;

use crate::adapters::{BackupService, ClusterClient, SnapshotService};
use crate::clock::Clock;
use crate::config::Config;

/// Shared context for the controller
pub struct Context {
    /// Cluster resource access
    pub cluster: Arc<dyn ClusterClient>,
    /// Storage holding backup artifacts
    pub backup_service: Arc<dyn BackupService>,
    /// Volume snapshot provider, if one is configured
    pub snapshot_service: Option<Arc<dyn SnapshotService>>,
    /// Time source for request expiry
    pub clock: Arc<dyn Clock>,
    /// Controller configuration
    pub config: Config,
}

impl Context {
    /// Create a new context
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        backup_service: Arc<dyn BackupService>,
        snapshot_service: Option<Arc<dyn SnapshotService>>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            cluster,
            backup_service,
            snapshot_service,
            clock,
            config,
        }
    }
}
