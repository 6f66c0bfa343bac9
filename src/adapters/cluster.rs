//! Cluster resource access for DeleteBackupRequests, Backups and Restores

use async_trait::async_trait;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams},
    Api, Client,
};
use serde_json::Value;

use crate::crd::{Backup, DeleteBackupRequest, Restore};
use crate::error::{Error, Result};

/// Field manager recorded on every patch issued by the controller
pub const FIELD_MANAGER: &str = "ark-backup-deletion-controller";

/// Operations the deletion workflow performs against the cluster.
///
/// Status patches are JSON merge patches applied to the status subresource.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Merge-patch the status of a DeleteBackupRequest
    async fn patch_delete_backup_request(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()>;

    /// Delete a single DeleteBackupRequest
    async fn delete_delete_backup_request(&self, namespace: &str, name: &str) -> Result<()>;

    /// Delete every DeleteBackupRequest in `namespace` matching `label_selector`
    async fn delete_delete_backup_requests(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<()>;

    /// Fetch a Backup; a missing backup is reported as [`Error::BackupNotFound`]
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Backup>;

    /// Merge-patch the status of a Backup
    async fn patch_backup(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>;

    /// Delete a Backup
    async fn delete_backup(&self, namespace: &str, name: &str) -> Result<()>;

    /// List every Restore in `namespace`
    async fn list_restores(&self, namespace: &str) -> Result<Vec<Restore>>;

    /// Delete a Restore
    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`ClusterClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new cluster client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn requests(&self, namespace: &str) -> Api<DeleteBackupRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn backups(&self, namespace: &str) -> Api<Backup> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn restores(&self, namespace: &str) -> Api<Restore> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn patch_delete_backup_request(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        self.requests(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn delete_delete_backup_request(&self, namespace: &str, name: &str) -> Result<()> {
        self.requests(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn delete_delete_backup_requests(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<()> {
        self.requests(namespace)
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(label_selector),
            )
            .await?;
        Ok(())
    }

    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Backup> {
        self.backups(namespace)
            .get(name)
            .await
            .map_err(|e| match e {
                kube::Error::Api(api_err) if api_err.code == 404 => {
                    Error::BackupNotFound(format!("{}/{}", namespace, name))
                }
                other => Error::Kube(other),
            })
    }

    async fn patch_backup(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        self.backups(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn delete_backup(&self, namespace: &str, name: &str) -> Result<()> {
        self.backups(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn list_restores(&self, namespace: &str) -> Result<Vec<Restore>> {
        let restores = self.restores(namespace).list(&ListParams::default()).await?;
        Ok(restores.items)
    }

    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<()> {
        self.restores(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
