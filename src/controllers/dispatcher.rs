//! Resolves queue keys against the local mirror and runs the processor

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, instrument};

use crate::adapters::RequestStore;
use crate::crd::DeleteBackupRequest;
use crate::error::{Error, Result};
use crate::reconcilers::ProcessRequest;

/// Queue key of a request: `namespace/name`
pub fn queue_key(req: &DeleteBackupRequest) -> String {
    format!(
        "{}/{}",
        req.namespace().unwrap_or_default(),
        req.name_any()
    )
}

/// Split a `namespace/name` key into its parts
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace, name))
        }
        _ => Err(Error::MalformedKey(key.to_string())),
    }
}

/// Hands queued requests to the processor
pub struct Dispatcher {
    store: Arc<dyn RequestStore>,
    processor: Arc<dyn ProcessRequest>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(store: Arc<dyn RequestStore>, processor: Arc<dyn ProcessRequest>) -> Self {
        Self { store, processor }
    }

    /// Process the request identified by `key`.
    ///
    /// A request missing from the mirror was deleted after being queued and
    /// is ignored, as is one that is already processed. Processor errors are
    /// returned unchanged so the caller can retry.
    #[instrument(skip(self))]
    pub async fn process_queue_item(&self, key: &str) -> Result<()> {
        let (namespace, name) = split_key(key)?;

        let Some(req) = self.store.get(namespace, name) else {
            debug!("Unable to find DeleteBackupRequest");
            return Ok(());
        };

        if req.is_processed() {
            debug!("DeleteBackupRequest already processed");
            return Ok(());
        }

        self.processor.process(&req).await
    }
}
