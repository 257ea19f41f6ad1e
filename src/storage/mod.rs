//! # Key-Value Storage
//!
//! The pending log lives in a string-keyed namespace with three operations:
//! `get`, `set` and `remove`. Backends:
//!
//! - [`MemoryStore`]: process-local map, with an optional byte quota so
//!   callers can exercise storage exhaustion
//! - [`sqlite::SqliteStore`]: a single SQLite table, survives restarts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use babysync::storage::{KeyValueStore, MemoryStore};
//!
//! # async fn example() -> Result<(), babysync::storage::StorageError> {
//! let store = MemoryStore::new();
//! store.set("pending-sync", "[]").await?;
//! assert_eq!(store.get("pending-sync").await?.as_deref(), Some("[]"));
//! # Ok(())
//! # }
//! ```

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::shared::SyncError;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Storage backend failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing would exceed the medium's capacity
    #[error("storage quota exceeded: {needed} bytes needed, {limit} available")]
    QuotaExceeded { needed: usize, limit: usize },
    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::persistence(err.to_string())
    }
}

/// Capability to read and write a string-keyed namespace
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory key-value namespace
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    /// Maximum total size of all values, in bytes
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose values may not exceed `bytes` in total
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(bytes),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;

        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let needed = others + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
