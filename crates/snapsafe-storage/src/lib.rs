//! Durable session storage for the SnapSafe client.
//!
//! This crate provides:
//! - A `KeyValueStorage` backend trait with file and in-memory implementations
//! - `SessionStore`, the best-effort typed API over a backend, which publishes
//!   a change notification for every successful mutation
//! - `PersistQueue`, an ordered fire-and-forget write path

mod credential;
mod file;
mod keys;
mod memory;
mod persist_queue;
mod session_store;
mod traits;

pub use credential::{ActiveIdentitySelector, AlternateCredential};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use persist_queue::{PersistQueue, StoreWrite};
pub use session_store::{ChangeKind, SessionStore, StoreChange};
pub use traits::KeyValueStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Stored document could not be parsed or written
    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a `SessionStore` backed by the JSON file at `path`.
pub fn create_file_store(path: &Path) -> SessionStore {
    SessionStore::new(Box::new(FileStorage::new(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys_unique_and_non_empty() {
        let unique: std::collections::HashSet<_> = StorageKeys::ALL.iter().collect();
        assert_eq!(unique.len(), StorageKeys::ALL.len(), "Storage keys must be unique");
        assert!(StorageKeys::ALL.iter().all(|key| !key.is_empty()));
    }

    #[test]
    fn test_create_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_file_store(&dir.path().join("store.json"));

        store.set_auth_cache(true);
        assert_eq!(store.auth_cache(), Some(true));
        assert!(dir.path().join("store.json").exists());
    }
}
