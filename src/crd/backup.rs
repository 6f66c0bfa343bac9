//! Backup Custom Resource Definition

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Backup resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ark.heptio.com",
    version = "v1",
    kind = "Backup",
    plural = "backups",
    singular = "backup",
    namespaced,
    status = "BackupStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// Namespaces to include (empty = all)
    #[serde(default)]
    pub included_namespaces: Vec<String>,

    /// Namespaces to exclude
    #[serde(default)]
    pub excluded_namespaces: Vec<String>,

    /// Whether persistent volumes were snapshotted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_volumes: Option<bool>,
}

/// Lifecycle phase of a Backup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum BackupPhase {
    #[default]
    #[serde(rename = "")]
    Unset,
    New,
    FailedValidation,
    InProgress,
    Completed,
    Failed,
    /// Set while the backup and its artifacts are being removed
    Deleting,
}

/// Backup status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    /// Current phase
    #[serde(default)]
    pub phase: BackupPhase,

    /// Volume ID -> snapshot ID for every volume snapshot taken
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volume_snapshots: BTreeMap<String, String>,

    /// Time the backup expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Backup {
    /// Snapshots taken by this backup, keyed by volume ID
    pub fn volume_snapshots(&self) -> Option<&BTreeMap<String, String>> {
        self.status
            .as_ref()
            .map(|s| &s.volume_snapshots)
            .filter(|snapshots| !snapshots.is_empty())
    }
}
