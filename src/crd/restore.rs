//! Restore Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Restore resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ark.heptio.com",
    version = "v1",
    kind = "Restore",
    plural = "restores",
    singular = "restore",
    namespaced,
    status = "RestoreStatus",
    printcolumn = r#"{"name": "Backup", "type": "string", "jsonPath": ".spec.backupName"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Name of the backup this restore reads from
    pub backup_name: String,

    /// Namespaces to include (empty = all)
    #[serde(default)]
    pub included_namespaces: Vec<String>,

    /// Namespaces to exclude
    #[serde(default)]
    pub excluded_namespaces: Vec<String>,
}

/// Lifecycle phase of a Restore
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RestorePhase {
    #[default]
    #[serde(rename = "")]
    Unset,
    New,
    FailedValidation,
    InProgress,
    Completed,
    Failed,
}

/// Restore status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RestorePhase,

    /// Number of warnings raised during the restore
    #[serde(default)]
    pub warnings: u32,

    /// Number of errors raised during the restore
    #[serde(default)]
    pub errors: u32,
}
