//! Reconcilers for DeleteBackupRequests
//!
//! This module contains the business logic of the deletion workflow:
//! - Driving a request through InProgress to Processed
//! - Deleting the backup, its restores, snapshots and stored artifacts
//! - Expiring processed requests after the retention window

pub mod backup_deletion;
pub mod expiry;

use async_trait::async_trait;

use crate::crd::DeleteBackupRequest;
use crate::error::Result;

pub use backup_deletion::RequestProcessor;
pub use expiry::ExpirySweeper;

/// Executes the deletion workflow for one request.
///
/// Only failures to persist the request's own status are returned; every
/// other failure ends up in the request's `status.errors`.
#[async_trait]
pub trait ProcessRequest: Send + Sync {
    async fn process(&self, req: &DeleteBackupRequest) -> Result<()>;
}
