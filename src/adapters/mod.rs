//! Adapters for the systems the deletion workflow talks to
//!
//! The controller only sees the traits defined here; the Kubernetes-backed
//! and filesystem-backed implementations are wired up in `main`.

mod cluster;
mod storage;
mod store;

pub use cluster::*;
pub use storage::*;
pub use store::*;
