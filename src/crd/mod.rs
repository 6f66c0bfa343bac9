//! Custom Resource Definitions for the Ark backup deletion workflow

mod backup;
mod delete_backup_request;
mod restore;

pub use backup::*;
pub use delete_backup_request::*;
pub use restore::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> serde_yaml::Result<Vec<String>> {
    Ok(vec![
        serde_yaml::to_string(&DeleteBackupRequest::crd())?,
        serde_yaml::to_string(&Backup::crd())?,
        serde_yaml::to_string(&Restore::crd())?,
    ])
}
