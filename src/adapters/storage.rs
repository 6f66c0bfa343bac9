//! Backup artifact storage and volume snapshot providers

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Object storage holding backup artifacts
#[async_trait]
pub trait BackupService: Send + Sync {
    /// Delete every artifact stored for `backup_name` in `bucket`
    async fn delete_backup_dir(&self, bucket: &str, backup_name: &str) -> Result<()>;
}

/// Cloud provider able to delete persistent volume snapshots
#[async_trait]
pub trait SnapshotService: Send + Sync {
    /// Delete the snapshot with the given provider ID
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;
}

/// [`BackupService`] over a mounted volume.
///
/// Buckets are directories directly under `root`, and each backup keeps its
/// artifacts in `<root>/<bucket>/<backup_name>/`.
#[derive(Debug, Clone)]
pub struct LocalBackupService {
    root: PathBuf,
}

impl LocalBackupService {
    /// Create a service rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the artifacts of one backup
    pub fn backup_dir(&self, bucket: &str, backup_name: &str) -> Result<PathBuf> {
        let bucket = single_component(bucket)?;
        let backup_name = single_component(backup_name)?;
        Ok(self.root.join(bucket).join(backup_name))
    }
}

/// Reject names that would escape their parent directory
fn single_component(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(Error::storage(format!("invalid path component '{}'", name))),
    }
}

#[async_trait]
impl BackupService for LocalBackupService {
    async fn delete_backup_dir(&self, bucket: &str, backup_name: &str) -> Result<()> {
        let dir = self.backup_dir(bucket, backup_name)?;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(path = %dir.display(), "Deleted backup directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %dir.display(), "Backup directory already absent");
                Ok(())
            }
            Err(e) => Err(Error::storage(format!(
                "error deleting backup directory {}: {}",
                dir.display(),
                e
            ))),
        }
    }
}
