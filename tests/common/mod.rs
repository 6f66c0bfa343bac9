//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::Value;

use ark_backup_deletion_controller::adapters::{
    BackupService, ClusterClient, RequestStore, SnapshotService,
};
use ark_backup_deletion_controller::crd::{
    new_delete_backup_request, Backup, BackupSpec, BackupStatus, DeleteBackupRequest,
    DeleteBackupRequestPhase, DeleteBackupRequestStatus, Restore, RestoreSpec,
};
use ark_backup_deletion_controller::error::{Error, Result};

pub const NAMESPACE: &str = "heptio-ark";
pub const BUCKET: &str = "bucket";

/// A call made against the fake cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PatchRequest { namespace: String, name: String, patch: String },
    DeleteRequest { namespace: String, name: String },
    DeleteRequests { namespace: String, selector: String },
    GetBackup { namespace: String, name: String },
    PatchBackup { namespace: String, name: String, patch: String },
    DeleteBackup { namespace: String, name: String },
    ListRestores { namespace: String },
    DeleteRestore { namespace: String, name: String },
}

impl Action {
    pub fn patch_request(name: &str, patch: &str) -> Self {
        Action::PatchRequest {
            namespace: NAMESPACE.to_string(),
            name: name.to_string(),
            patch: patch.to_string(),
        }
    }

    pub fn get_backup(name: &str) -> Self {
        Action::GetBackup {
            namespace: NAMESPACE.to_string(),
            name: name.to_string(),
        }
    }

    pub fn patch_backup(name: &str, patch: &str) -> Self {
        Action::PatchBackup {
            namespace: NAMESPACE.to_string(),
            name: name.to_string(),
            patch: patch.to_string(),
        }
    }

    pub fn delete_backup(name: &str) -> Self {
        Action::DeleteBackup {
            namespace: NAMESPACE.to_string(),
            name: name.to_string(),
        }
    }

    pub fn list_restores() -> Self {
        Action::ListRestores {
            namespace: NAMESPACE.to_string(),
        }
    }

    pub fn delete_restore(name: &str) -> Self {
        Action::DeleteRestore {
            namespace: NAMESPACE.to_string(),
            name: name.to_string(),
        }
    }

    pub fn delete_requests(selector: &str) -> Self {
        Action::DeleteRequests {
            namespace: NAMESPACE.to_string(),
            selector: selector.to_string(),
        }
    }
}

/// Operations the fake cluster can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    PatchRequest,
    DeleteRequest,
    DeleteRequests,
    GetBackup,
    PatchBackup,
    DeleteBackup,
    ListRestores,
    DeleteRestore,
}

/// In-memory cluster recording every call
#[derive(Default)]
pub struct FakeCluster {
    actions: Mutex<Vec<Action>>,
    backups: Mutex<HashMap<String, Backup>>,
    restores: Mutex<Vec<Restore>>,
    failures: Mutex<HashMap<Verb, String>>,
    request_patch_failure: Mutex<Option<(String, String)>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_backup(&self, backup: Backup) {
        let name = backup.metadata.name.clone().unwrap_or_default();
        self.backups.lock().unwrap().insert(name, backup);
    }

    pub fn add_restore(&self, restore: Restore) {
        self.restores.lock().unwrap().push(restore);
    }

    /// Make every call of `verb` fail with `message`
    pub fn fail_on(&self, verb: Verb, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(verb, message.to_string());
    }

    /// Fail request status patches whose body contains `needle`
    pub fn fail_request_patch_containing(&self, needle: &str, message: &str) {
        *self.request_patch_failure.lock().unwrap() =
            Some((needle.to_string(), message.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
        self.request_patch_failure.lock().unwrap().take();
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    pub fn clear_actions(&self) {
        self.actions.lock().unwrap().clear();
    }

    pub fn has_backup(&self, name: &str) -> bool {
        self.backups.lock().unwrap().contains_key(name)
    }

    fn record(&self, action: Action, verb: Verb) -> Result<()> {
        self.actions.lock().unwrap().push(action);
        match self.failures.lock().unwrap().get(&verb) {
            Some(message) => Err(Error::storage(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn patch_delete_backup_request(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        let patch = serde_json::to_string(patch)?;
        let failure = self
            .request_patch_failure
            .lock()
            .unwrap()
            .clone()
            .filter(|(needle, _)| patch.contains(needle.as_str()));
        self.record(
            Action::PatchRequest {
                namespace: namespace.to_string(),
                name: name.to_string(),
                patch,
            },
            Verb::PatchRequest,
        )?;
        match failure {
            Some((_, message)) => Err(Error::storage(message)),
            None => Ok(()),
        }
    }

    async fn delete_delete_backup_request(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(
            Action::DeleteRequest {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Verb::DeleteRequest,
        )
    }

    async fn delete_delete_backup_requests(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<()> {
        self.record(
            Action::DeleteRequests {
                namespace: namespace.to_string(),
                selector: label_selector.to_string(),
            },
            Verb::DeleteRequests,
        )
    }

    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Backup> {
        self.record(
            Action::GetBackup {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Verb::GetBackup,
        )?;
        self.backups
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BackupNotFound(format!("{}/{}", namespace, name)))
    }

    async fn patch_backup(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        let patch = serde_json::to_string(patch)?;
        self.record(
            Action::PatchBackup {
                namespace: namespace.to_string(),
                name: name.to_string(),
                patch,
            },
            Verb::PatchBackup,
        )
    }

    async fn delete_backup(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(
            Action::DeleteBackup {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Verb::DeleteBackup,
        )?;
        self.backups.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_restores(&self, namespace: &str) -> Result<Vec<Restore>> {
        self.record(
            Action::ListRestores {
                namespace: namespace.to_string(),
            },
            Verb::ListRestores,
        )?;
        Ok(self.restores.lock().unwrap().clone())
    }

    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(
            Action::DeleteRestore {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Verb::DeleteRestore,
        )?;
        self.restores
            .lock()
            .unwrap()
            .retain(|r| r.metadata.name.as_deref() != Some(name));
        Ok(())
    }
}

/// Records deleted backup directories
#[derive(Default)]
pub struct FakeBackupService {
    pub deleted: Mutex<Vec<(String, String)>>,
    pub error: Mutex<Option<String>>,
}

#[async_trait]
impl BackupService for FakeBackupService {
    async fn delete_backup_dir(&self, bucket: &str, backup_name: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push((bucket.to_string(), backup_name.to_string()));
        match self.error.lock().unwrap().clone() {
            Some(message) => Err(Error::storage(message)),
            None => Ok(()),
        }
    }
}

/// Tracks which snapshots still exist
#[derive(Default)]
pub struct FakeSnapshotService {
    pub snapshots_taken: Mutex<BTreeSet<String>>,
}

impl FakeSnapshotService {
    pub fn with_snapshots(ids: &[&str]) -> Arc<Self> {
        let service = Self::default();
        service
            .snapshots_taken
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        Arc::new(service)
    }

    pub fn remaining(&self) -> usize {
        self.snapshots_taken.lock().unwrap().len()
    }
}

#[async_trait]
impl SnapshotService for FakeSnapshotService {
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        if self.snapshots_taken.lock().unwrap().remove(snapshot_id) {
            Ok(())
        } else {
            Err(Error::snapshot("snapshot not found"))
        }
    }
}

/// Local mirror backed by a vector
#[derive(Default)]
pub struct MemoryStore {
    requests: Mutex<Vec<Arc<DeleteBackupRequest>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace a request
    pub fn add(&self, req: DeleteBackupRequest) {
        let mut requests = self.requests.lock().unwrap();
        requests.retain(|r| {
            r.metadata.namespace != req.metadata.namespace || r.metadata.name != req.metadata.name
        });
        requests.push(Arc::new(req));
    }
}

impl RequestStore for MemoryStore {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<DeleteBackupRequest>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.metadata.namespace.as_deref() == Some(namespace)
                    && r.metadata.name.as_deref() == Some(name)
            })
            .cloned()
    }

    fn list(&self) -> Vec<Arc<DeleteBackupRequest>> {
        self.requests.lock().unwrap().clone()
    }
}

/// Request to delete backup `foo` (UID `uid`), named `foo-abcde`
pub fn test_request(phase: DeleteBackupRequestPhase) -> DeleteBackupRequest {
    let mut req = new_delete_backup_request("foo", "uid");
    req.metadata.namespace = Some(NAMESPACE.to_string());
    req.metadata.name = Some("foo-abcde".to_string());
    req.status = Some(DeleteBackupRequestStatus {
        phase,
        errors: vec![],
    });
    req
}

/// Request in namespace `ns` with the given name, phase and creation time
pub fn aged_request(
    name: &str,
    phase: DeleteBackupRequestPhase,
    created: DateTime<Utc>,
) -> DeleteBackupRequest {
    let mut req = new_delete_backup_request("foo", "uid");
    req.metadata.namespace = Some("ns".to_string());
    req.metadata.name = Some(name.to_string());
    req.metadata.creation_timestamp = Some(Time(created));
    req.status = Some(DeleteBackupRequestStatus {
        phase,
        errors: vec![],
    });
    req
}

/// Backup with the given name, UID and volume snapshots
pub fn test_backup(name: &str, uid: &str, snapshots: &[(&str, &str)]) -> Backup {
    let mut backup = Backup::new(name, BackupSpec::default());
    backup.metadata.namespace = Some(NAMESPACE.to_string());
    backup.metadata.uid = Some(uid.to_string());
    backup.status = Some(BackupStatus {
        volume_snapshots: snapshots
            .iter()
            .map(|(volume, snapshot)| (volume.to_string(), snapshot.to_string()))
            .collect(),
        ..Default::default()
    });
    backup
}

/// Restore of `backup_name`
pub fn test_restore(name: &str, backup_name: &str) -> Restore {
    let mut restore = Restore::new(
        name,
        RestoreSpec {
            backup_name: backup_name.to_string(),
            ..Default::default()
        },
    );
    restore.metadata.namespace = Some(NAMESPACE.to_string());
    restore
}
