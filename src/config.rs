//! Controller configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default number of deletion workers
const DEFAULT_WORKERS: usize = 1;

/// Default retention for processed requests (24 hours)
const DEFAULT_MAX_REQUEST_AGE_SECS: u64 = 24 * 60 * 60;

/// Default interval between full resyncs of the request mirror
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60 * 60;

/// Default interval between expiry sweeps
const DEFAULT_GC_INTERVAL_SECS: u64 = 60 * 60;

/// Default metrics port
const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default mount point of the backup storage volume
const DEFAULT_STORAGE_ROOT: &str = "/data";

/// Controller configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Object storage bucket holding backup artifacts
    pub backup_bucket: String,

    /// Mount point of the volume holding backup buckets
    pub storage_root: PathBuf,

    /// Namespace to watch (all namespaces when unset)
    pub namespace: Option<String>,

    /// Number of concurrent deletion workers (default: 1)
    pub workers: usize,

    /// Age after which processed requests are removed (default: 24h)
    pub max_request_age: Duration,

    /// Interval between re-enqueues of every known request (default: 1h)
    pub resync_interval: Duration,

    /// Interval between expiry sweeps (default: 1h)
    pub gc_interval: Duration,

    /// Port serving metrics and health endpoints (default: 8080)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backup_bucket = lookup("ARK_BACKUP_BUCKET")
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| Error::config("ARK_BACKUP_BUCKET must be set"))?;

        let config = Self {
            backup_bucket,
            storage_root: lookup("ARK_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            namespace: lookup("ARK_NAMESPACE").filter(|ns| !ns.is_empty()),
            workers: parse_or(&lookup, "DELETION_WORKERS", DEFAULT_WORKERS)?,
            max_request_age: Duration::from_secs(parse_or(
                &lookup,
                "DELETE_REQUEST_MAX_AGE_SECS",
                DEFAULT_MAX_REQUEST_AGE_SECS,
            )?),
            resync_interval: Duration::from_secs(parse_or(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            )?),
            gc_interval: Duration::from_secs(parse_or(
                &lookup,
                "GC_INTERVAL_SECS",
                DEFAULT_GC_INTERVAL_SECS,
            )?),
            metrics_port: parse_or(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("DELETION_WORKERS must be at least 1"));
        }
        if self.max_request_age.is_zero() {
            return Err(Error::config("DELETE_REQUEST_MAX_AGE_SECS must be positive"));
        }
        if self.resync_interval.is_zero() || self.gc_interval.is_zero() {
            return Err(Error::config("resync and gc intervals must be positive"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
