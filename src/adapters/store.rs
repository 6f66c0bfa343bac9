//! Read access to the local mirror of DeleteBackupRequests

use std::sync::Arc;

use kube::runtime::reflector::{ObjectRef, Store};

use crate::crd::DeleteBackupRequest;

/// Eventually-consistent, read-only view of the watched requests
pub trait RequestStore: Send + Sync {
    /// Look up a request by namespace and name
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<DeleteBackupRequest>>;

    /// Every request currently known
    fn list(&self) -> Vec<Arc<DeleteBackupRequest>>;
}

impl RequestStore for Store<DeleteBackupRequest> {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<DeleteBackupRequest>> {
        Store::get(self, &ObjectRef::new(name).within(namespace))
    }

    fn list(&self) -> Vec<Arc<DeleteBackupRequest>> {
        self.state()
    }
}
