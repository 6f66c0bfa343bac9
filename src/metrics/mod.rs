//! Prometheus metrics for the backup deletion controller
//!
//! This module exposes metrics for monitoring controller health and the
//! outcome of backup deletions.

mod prometheus;

pub use prometheus::*;
