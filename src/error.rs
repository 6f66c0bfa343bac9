//! Error types for the backup deletion controller

use thiserror::Error;

/// Result type alias using the controller's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Queue key is not of the form `namespace/name`
    #[error("unexpected key format: {0:?}")]
    MalformedKey(String),

    /// Backup not found
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// Failed to persist a status transition
    #[error("error patching {kind}: {source}")]
    Patch {
        kind: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Volume snapshot provider error
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The change feed or local mirror failed
    #[error("Watch error: {0}")]
    Watch(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Error::Snapshot(msg.into())
    }

    /// Create a watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Error::Watch(msg.into())
    }

    /// Wrap a failed status patch on an object of the given kind
    pub fn patch(kind: &'static str, source: Error) -> Self {
        Error::Patch {
            kind,
            source: Box::new(source),
        }
    }

    /// Whether the error means the target object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::BackupNotFound(_) => true,
            Error::Kube(kube::Error::Api(api_err)) => api_err.code == 404,
            _ => false,
        }
    }

    /// Whether retrying the same queue item can ever succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::MalformedKey(_))
    }
}
