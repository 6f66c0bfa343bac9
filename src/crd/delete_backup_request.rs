//! DeleteBackupRequest Custom Resource Definition

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Label carrying the name of the backup a request targets
pub const BACKUP_NAME_LABEL: &str = "ark.heptio.com/backup-name";

/// Label carrying the UID of the backup a request targets
pub const BACKUP_UID_LABEL: &str = "ark.heptio.com/backup-uid";

/// Maximum length of a Kubernetes label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Number of digest characters appended to shortened label values
const LABEL_HASH_LEN: usize = 6;

/// DeleteBackupRequest resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ark.heptio.com",
    version = "v1",
    kind = "DeleteBackupRequest",
    plural = "deletebackuprequests",
    singular = "deletebackuprequest",
    namespaced,
    status = "DeleteBackupRequestStatus",
    printcolumn = r#"{"name": "Backup", "type": "string", "jsonPath": ".spec.targetBackupName"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBackupRequestSpec {
    /// Name of the backup to delete
    pub target_backup_name: String,

    /// UID of the backup when the request was created
    #[serde(rename = "targetBackupUID", default)]
    pub target_backup_uid: String,
}

/// Processing phase of a DeleteBackupRequest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum DeleteBackupRequestPhase {
    /// Not yet observed by the controller; handled like `New`
    #[default]
    #[serde(rename = "")]
    Unset,
    New,
    InProgress,
    Processed,
}

/// DeleteBackupRequest status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBackupRequestStatus {
    /// Current phase
    #[serde(default)]
    pub phase: DeleteBackupRequestPhase,

    /// Failures encountered while deleting the backup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl DeleteBackupRequest {
    /// Current phase, treating a missing status as `Unset`
    pub fn phase(&self) -> DeleteBackupRequestPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Whether the controller has finished with this request
    pub fn is_processed(&self) -> bool {
        self.phase() == DeleteBackupRequestPhase::Processed
    }
}

/// Build a new request to delete the backup with the given name and UID.
///
/// The name is generated by the API server from the backup name, and the
/// request is labelled so sibling requests for the same backup can be
/// selected together.
pub fn new_delete_backup_request(backup_name: &str, backup_uid: &str) -> DeleteBackupRequest {
    let labels = BTreeMap::from([
        (BACKUP_NAME_LABEL.to_string(), label_value(backup_name)),
        (BACKUP_UID_LABEL.to_string(), label_value(backup_uid)),
    ]);

    DeleteBackupRequest {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", backup_name)),
            labels: Some(labels),
            ..Default::default()
        },
        spec: DeleteBackupRequestSpec {
            target_backup_name: backup_name.to_string(),
            target_backup_uid: backup_uid.to_string(),
        },
        status: None,
    }
}

/// Label selector matching every request for one backup incarnation
pub fn sibling_label_selector(backup_name: &str, backup_uid: &str) -> String {
    format!(
        "{}={},{}={}",
        BACKUP_NAME_LABEL,
        label_value(backup_name),
        BACKUP_UID_LABEL,
        label_value(backup_uid)
    )
}

/// Convert an arbitrary string into a valid label value.
///
/// Values that fit are returned unchanged; longer ones are cut and suffixed
/// with a short SHA-256 digest of the full value so distinct inputs stay
/// distinct.
pub fn label_value(value: &str) -> String {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value.to_string();
    }

    let digest = format!("{:x}", Sha256::digest(value.as_bytes()));
    let mut cut = MAX_LABEL_VALUE_LEN - LABEL_HASH_LEN;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("{}{}", &value[..cut], &digest[..LABEL_HASH_LEN])
}
