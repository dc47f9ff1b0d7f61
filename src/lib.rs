//! homecloud-meta - File metadata store for a personal cloud drive
//!
//! This crate keeps the metadata side of a drive: the file and folder tree,
//! content revisions, sharing permissions and per-user storage accounting.
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)
//! - Role hierarchy for permission checks
//! - Per-call deadline and cancellation via [`context::Context`]
//! - Async trait facade in [`service`] for request-parallel callers
//!
//! File contents live in a separate blob store; records only carry a
//! `storage_path` pointer and checksums.

pub mod config;
pub mod context;
pub mod service;
pub mod storage;
pub mod telemetry;
#[cfg(test)]
pub mod testutil;

pub use config::Config;
pub use context::Context;
pub use service::MetadataService;
pub use storage::{Database, ErrorKind, StoreError, StoreResult};
