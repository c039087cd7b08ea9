//! # Loto Storage
//!
//! Durable application state for the loto generator.
//!
//! ## Features
//!
//! - **KeyValueStore**: string-keyed text storage that degrades instead of failing
//! - **MemoryStore / FileStore**: in-process and on-disk backends
//! - **WriteQueue**: background persistence, one store write per update
//! - **PersistedCell**: a value bound to one key, hydrated once, persisted on every write
//!
//! ## Architecture
//!
//! ```text
//! Storage
//!     ├── Arc<dyn KeyValueStore>   (reads at hydration)
//!     └── WriteQueue               (FIFO writer task)
//!             ▲
//!             │ submit(key, json)
//!     PersistedCell<T> ── value: T (authoritative in memory)
//! ```

use std::sync::Arc;
use thiserror::Error;

pub mod cell;
pub mod queue;
pub mod store;

pub use cell::{hydrate, DefaultReason, Hydration, PersistedCell, Update};
pub use queue::{PendingWrite, WriteQueue};
pub use store::{FileStore, KeyValueStore, MemoryStore};

// ==================== Errors ====================

/// Errors reported by storage backends.
///
/// These never cross the [`PersistedCell`] boundary; the cell turns them
/// into defaults (on read) or a `false` acknowledgement (on write).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Quota exceeded: {needed} bytes needed, limit is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ==================== Storage ====================

/// A backing store together with the queue that writes to it.
///
/// Cloning is cheap; all clones share the same writer task.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn KeyValueStore>,
    queue: WriteQueue,
}

impl Storage {
    /// Wrap a store and spawn its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let queue = WriteQueue::spawn(Arc::clone(&store));
        Self { store, queue }
    }

    /// The backing store.
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// The writer queue.
    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Wait until every write submitted so far has been attempted.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: StorageError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, StorageError::Io(ref msg) if msg.contains("denied")));
    }

    #[tokio::test]
    async fn test_storage_flush_after_direct_submit() {
        let memory = Arc::new(MemoryStore::new());
        let storage = Storage::new(memory.clone());

        let _ = storage.queue().submit("k", "\"v\"".to_string());
        storage.flush().await;

        assert_eq!(memory.get("k").await, Some("\"v\"".to_string()));
    }
}
