//! Ark Backup Deletion Controller
//!
//! This controller executes DeleteBackupRequests: it deletes a backup together
//! with its restores, volume snapshots and stored artifacts, records what
//! failed on the request, and expires processed requests after a retention
//! window.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod reconcilers;

pub use error::{Error, Result};
