//! Local snapshot persistence.
//!
//! Snapshots saved here are a per-peer convenience (for example, keeping code
//! text across a reload). They are never authoritative: a snapshot received
//! through the join protocol always replaces them.

mod autosave;
mod file;
mod memory;

pub use autosave::{AutoSnapshot, DEFAULT_AUTOSAVE_INTERVAL_SECS, LAST_SESSION_KEY};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::state::Snapshot;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Trait for snapshot storage backends.
pub trait SnapshotStorage: Send + Sync {
    /// Save a snapshot.
    fn save(&self, id: &str, snapshot: &Snapshot) -> BoxFuture<'_, StorageResult<()>>;

    /// Load a snapshot.
    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Snapshot>>;

    /// Delete a snapshot.
    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all snapshot IDs.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a snapshot exists.
    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>>;
}
