//! DeleteBackupRequest processor
//!
//! Turns one request into a best-effort deletion of the backup and
//! everything that depends on it:
//! - Marks the request InProgress before anything is destroyed
//! - Marks the backup Deleting, then removes its restores, volume
//!   snapshots, stored artifacts and finally the Backup object
//! - Records every failed step in the request's status and marks it Processed
//! - Removes sibling requests for the same backup incarnation

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::adapters::{BackupService, ClusterClient, SnapshotService};
use crate::crd::{
    sibling_label_selector, Backup, BackupPhase, DeleteBackupRequest, DeleteBackupRequestPhase,
};
use crate::error::{Error, Result};
use crate::metrics;

use super::ProcessRequest;

/// Error recorded when the target backup does not exist
pub const BACKUP_NOT_FOUND: &str = "backup not found";

/// Error recorded when a backup has snapshots but no provider can delete them
pub const SNAPSHOTS_WITHOUT_PROVIDER: &str = "unable to delete backup because it includes PV snapshots and Ark is not configured with a PersistentVolumeProvider";

/// Failures collected from independent cleanup steps
#[derive(Debug, Default)]
struct CleanupErrors {
    errors: Vec<String>,
}

impl CleanupErrors {
    fn push(&mut self, step: &'static str, message: String) {
        warn!(step, error = %message, "Cleanup step failed");
        metrics::CLEANUP_FAILURES.with_label_values(&[step]).inc();
        self.errors.push(message);
    }

    /// Record the outcome of one step; returns whether it succeeded
    fn record(
        &mut self,
        step: &'static str,
        result: Result<()>,
        context: impl FnOnce() -> String,
    ) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.push(step, format!("{}: {}", context(), e));
                false
            }
        }
    }

    fn into_inner(self) -> Vec<String> {
        self.errors
    }
}

/// Outcome of resolving and deleting the target backup
enum Deletion {
    /// The backup was absent or ineligible; nothing was touched
    Skipped(Vec<String>),
    /// Cleanup ran; siblings of this backup incarnation can be collected
    Attempted(Vec<String>),
}

/// Runs the deletion workflow against the cluster and storage providers
pub struct RequestProcessor {
    client: Arc<dyn ClusterClient>,
    backup_service: Arc<dyn BackupService>,
    snapshot_service: Option<Arc<dyn SnapshotService>>,
    bucket: String,
}

impl RequestProcessor {
    /// Create a new processor
    pub fn new(
        client: Arc<dyn ClusterClient>,
        backup_service: Arc<dyn BackupService>,
        snapshot_service: Option<Arc<dyn SnapshotService>>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            backup_service,
            snapshot_service,
            bucket: bucket.into(),
        }
    }

    async fn patch_request(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        self.client
            .patch_delete_backup_request(namespace, name, &patch)
            .await
            .map_err(|e| Error::patch("DeleteBackupRequest", e))
    }

    /// Resolve the backup and delete it together with its dependents
    async fn delete_backup(&self, namespace: &str, backup_name: &str) -> Deletion {
        let backup = match self.client.get_backup(namespace, backup_name).await {
            Ok(backup) => backup,
            Err(e) if e.is_not_found() => {
                info!("Backup not found");
                return Deletion::Skipped(vec![BACKUP_NOT_FOUND.to_string()]);
            }
            Err(e) => {
                warn!(error = %e, "Error getting backup");
                return Deletion::Skipped(vec![format!("error getting backup: {}", e)]);
            }
        };

        if backup.volume_snapshots().is_some() && self.snapshot_service.is_none() {
            warn!("Backup has volume snapshots but no snapshot provider is configured");
            return Deletion::Skipped(vec![SNAPSHOTS_WITHOUT_PROVIDER.to_string()]);
        }

        Deletion::Attempted(self.cleanup(namespace, &backup).await)
    }

    /// Best-effort removal of the backup and its dependents.
    ///
    /// Every step runs regardless of earlier failures.
    async fn cleanup(&self, namespace: &str, backup: &Backup) -> Vec<String> {
        let backup_name = backup.name_any();
        let mut errors = CleanupErrors::default();

        let deleting = json!({ "status": { "phase": BackupPhase::Deleting } });
        errors.record(
            "backup_phase",
            self.client.patch_backup(namespace, &backup_name, &deleting).await,
            || "error patching Backup".to_string(),
        );

        self.delete_restores(namespace, &backup_name, &mut errors).await;

        if let (Some(snapshots), Some(service)) = (backup.volume_snapshots(), &self.snapshot_service)
        {
            for (volume_id, snapshot_id) in snapshots {
                info!(volume = %volume_id, snapshot = %snapshot_id, "Deleting volume snapshot");
                let deleted = errors.record(
                    "snapshot",
                    service.delete_snapshot(snapshot_id).await,
                    || format!("error deleting snapshot {}", snapshot_id),
                );
                if deleted {
                    metrics::SNAPSHOTS_DELETED.inc();
                }
            }
        }

        info!(bucket = %self.bucket, "Deleting backup files from object storage");
        errors.record(
            "backup_files",
            self.backup_service
                .delete_backup_dir(&self.bucket, &backup_name)
                .await,
            || "error deleting backup files".to_string(),
        );

        info!("Deleting Backup");
        errors.record(
            "backup",
            self.client.delete_backup(namespace, &backup_name).await,
            || "error deleting Backup".to_string(),
        );

        errors.into_inner()
    }

    async fn delete_restores(&self, namespace: &str, backup_name: &str, errors: &mut CleanupErrors) {
        let restores = match self.client.list_restores(namespace).await {
            Ok(restores) => restores,
            Err(e) => {
                errors.push("restores", format!("error listing restores: {}", e));
                return;
            }
        };

        for restore in restores
            .iter()
            .filter(|r| r.spec.backup_name == backup_name)
        {
            let restore_name = restore.name_any();
            info!(restore = %restore_name, "Deleting Restore");
            errors.record(
                "restore",
                self.client.delete_restore(namespace, &restore_name).await,
                || format!("error deleting Restore {}/{}", namespace, restore_name),
            );
        }
    }
}

/// Merge patch moving a request to Processed with the collected errors
pub fn processed_patch(errors: &[String]) -> Value {
    if errors.is_empty() {
        json!({ "status": { "phase": DeleteBackupRequestPhase::Processed } })
    } else {
        json!({ "status": { "errors": errors, "phase": DeleteBackupRequestPhase::Processed } })
    }
}

#[async_trait]
impl ProcessRequest for RequestProcessor {
    #[instrument(
        skip_all,
        fields(name = %req.name_any(), namespace = req.namespace(), backup = %req.spec.target_backup_name)
    )]
    async fn process(&self, req: &DeleteBackupRequest) -> Result<()> {
        let _timer = metrics::PROCESS_DURATION.start_timer();
        let name = req.name_any();
        let namespace = req.namespace().unwrap_or_else(|| "default".to_string());
        let backup_name = &req.spec.target_backup_name;

        info!("Processing DeleteBackupRequest");

        self.patch_request(
            &namespace,
            &name,
            json!({ "status": { "phase": DeleteBackupRequestPhase::InProgress } }),
        )
        .await?;

        let (errors, collect_siblings) = match self.delete_backup(&namespace, backup_name).await {
            Deletion::Skipped(errors) => (errors, false),
            Deletion::Attempted(errors) => (errors, true),
        };

        self.patch_request(&namespace, &name, processed_patch(&errors))
            .await?;

        let outcome = if errors.is_empty() { "success" } else { "with_errors" };
        metrics::REQUESTS_PROCESSED.with_label_values(&[outcome]).inc();
        info!(errors = errors.len(), "DeleteBackupRequest processed");

        if collect_siblings {
            let selector = sibling_label_selector(backup_name, &req.spec.target_backup_uid);
            if let Err(e) = self
                .client
                .delete_delete_backup_requests(&namespace, &selector)
                .await
            {
                warn!(error = %e, selector = %selector, "Error deleting sibling DeleteBackupRequests");
                metrics::CLEANUP_FAILURES
                    .with_label_values(&["sibling_requests"])
                    .inc();
            }
        }

        Ok(())
    }
}
