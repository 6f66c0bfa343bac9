//! Expiry of processed DeleteBackupRequests

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, error, info};

use crate::adapters::{ClusterClient, RequestStore};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::metrics;

/// Deletes processed requests once they are older than the retention window
pub struct ExpirySweeper {
    client: Arc<dyn ClusterClient>,
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    max_age: chrono::Duration,
}

impl ExpirySweeper {
    /// Create a sweeper keeping processed requests for `max_age`
    pub fn new(
        client: Arc<dyn ClusterClient>,
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
        max_age: Duration,
    ) -> Result<Self> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| Error::config(format!("invalid request max age: {}", e)))?;

        Ok(Self {
            client,
            store,
            clock,
            max_age,
        })
    }

    /// Sweep using the injected clock; returns the number of deleted requests
    pub async fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now()).await
    }

    /// Delete every processed request at least `max_age` old at `now`.
    ///
    /// Requests that are not yet processed are never deleted. Failed deletes
    /// are left for the next sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut deleted = 0;

        for req in self.store.list() {
            let name = req.name_any();
            let namespace = req.namespace().unwrap_or_else(|| "default".to_string());

            if !req.is_processed() {
                debug!(namespace = %namespace, name = %name, "Skipping unprocessed DeleteBackupRequest");
                continue;
            }

            let Some(created) = req.metadata.creation_timestamp.as_ref().map(|t| t.0) else {
                debug!(namespace = %namespace, name = %name, "DeleteBackupRequest has no creation timestamp");
                continue;
            };

            if now - created < self.max_age {
                continue;
            }

            info!(namespace = %namespace, name = %name, "Deleting expired DeleteBackupRequest");
            match self
                .client
                .delete_delete_backup_request(&namespace, &name)
                .await
            {
                Ok(()) => {
                    deleted += 1;
                    metrics::EXPIRED_REQUESTS_DELETED
                        .with_label_values(&["success"])
                        .inc();
                }
                Err(e) => {
                    error!(namespace = %namespace, name = %name, error = %e, "Error deleting expired DeleteBackupRequest");
                    metrics::EXPIRED_REQUESTS_DELETED
                        .with_label_values(&["failure"])
                        .inc();
                }
            }
        }

        deleted
    }
}
