//! # Pending-Operation Store
//!
//! Durable, ordered log of mutations that the remote API has not confirmed
//! yet. The whole log is kept as one JSON array under a fixed storage key:
//!
//! ```json
//! [{"id":"…","kind":"CREATE","target":"/events","payload":{"type":"pipi"},"enqueuedAt":1718000000000,"attempts":0}]
//! ```
//!
//! Every mutation goes through a single lock and is written to storage
//! before the in-memory copy changes, so a failed write leaves both
//! untouched.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use babysync::offline::queue::{Mutation, PendingStore};
//! use babysync::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), babysync::SyncError> {
//! let store = PendingStore::open(Arc::new(MemoryStore::new()), "pending-sync").await?;
//! let id = store
//!     .enqueue(Mutation::Create(serde_json::json!({"type": "pipi"})), "/events")
//!     .await?;
//!
//! for op in store.list_pending().await {
//!     // replay op…
//! }
//! store.remove_completed(&[id].into_iter().collect()).await?;
//! # Ok(())
//! # }
//! ```

use crate::shared::SyncError;
use crate::storage::KeyValueStore;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Intent of a queued operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Replayed as POST
    Create,
    /// Replayed as PUT
    Update,
    /// Replayed as DELETE
    Delete,
}

impl OperationKind {
    /// HTTP verb this kind is replayed with
    pub fn method(&self) -> &'static str {
        match self {
            OperationKind::Create => "POST",
            OperationKind::Update => "PUT",
            OperationKind::Delete => "DELETE",
        }
    }

    /// Whether entries of this kind carry a body
    pub fn expects_payload(&self) -> bool {
        !matches!(self, OperationKind::Delete)
    }
}

/// A mutation requested by a caller
///
/// Create and Update always carry a body, Delete never does.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(Value),
    Update(Value),
    Delete,
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Create(_) => OperationKind::Create,
            Mutation::Update(_) => OperationKind::Update,
            Mutation::Delete => OperationKind::Delete,
        }
    }

    fn into_payload(self) -> Option<Value> {
        match self {
            Mutation::Create(body) | Mutation::Update(body) => Some(body),
            Mutation::Delete => None,
        }
    }
}

/// A queued mutation not yet confirmed by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Unique id assigned at enqueue time
    pub id: Uuid,
    /// Intent of the operation
    pub kind: OperationKind,
    /// Resource path the operation applies to
    pub target: String,
    /// Request body for Create and Update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Creation time, epoch milliseconds on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Time of the most recent failed attempt
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Timestamps are persisted as epoch milliseconds; keep memory at the same
/// precision so a reloaded log equals the live one
fn wire_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Durable ordered log of pending operations
pub struct PendingStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    log: Mutex<Vec<PendingOperation>>,
}

impl std::fmt::Debug for PendingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingStore").field("key", &self.key).finish_non_exhaustive()
    }
}

impl PendingStore {
    /// Load the log persisted under `key`
    ///
    /// A value that does not parse is logged and replaced by an empty log.
    /// A storage read failure is returned.
    pub async fn open(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Result<Self, SyncError> {
        let key = key.into();
        let log = match storage.get(&key).await? {
            Some(raw) => match serde_json::from_str::<Vec<PendingOperation>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "unreadable pending log, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        tracing::debug!(key = %key, entries = log.len(), "pending log loaded");

        Ok(Self {
            storage,
            key,
            log: Mutex::new(log),
        })
    }

    /// Append a mutation and persist it before returning its id
    pub async fn enqueue(&self, mutation: Mutation, target: impl Into<String>) -> Result<Uuid, SyncError> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(SyncError::validation("target", "must not be empty"));
        }
        if matches!(&mutation, Mutation::Create(Value::Null) | Mutation::Update(Value::Null)) {
            return Err(SyncError::validation("payload", "must not be null"));
        }

        let kind = mutation.kind();
        let entry = PendingOperation {
            id: Uuid::new_v4(),
            kind,
            target,
            payload: mutation.into_payload(),
            enqueued_at: wire_precision(Utc::now()),
            attempts: 0,
            last_attempt_at: None,
        };
        let id = entry.id;

        let mut log = self.log.lock().await;
        let mut next = log.clone();
        next.push(entry);

        if let Err(e) = self.persist(&next).await {
            tracing::error!(error = %e, kind = kind.method(), "operation dropped, pending log not persisted");
            return Err(e);
        }
        *log = next;

        tracing::debug!(%id, kind = kind.method(), "operation queued");
        Ok(id)
    }

    /// Snapshot of every entry in enqueue order
    pub async fn list_pending(&self) -> Vec<PendingOperation> {
        self.log.lock().await.clone()
    }

    /// Number of entries in the log
    pub async fn pending_count(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Remove the entries whose id is in `ids`, returning how many went away
    ///
    /// Unknown ids are ignored.
    pub async fn remove_completed(&self, ids: &HashSet<Uuid>) -> Result<usize, SyncError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.retain(|op| !ids.contains(&op.id)).await
    }

    /// Remove entries enqueued more than `max_age` ago
    pub async fn prune_older_than(&self, max_age: chrono::Duration) -> Result<usize, SyncError> {
        self.prune_before(Utc::now() - max_age).await
    }

    /// Remove entries enqueued strictly before `cutoff`
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, SyncError> {
        let pruned = self.retain(|op| op.enqueued_at >= cutoff).await?;
        if pruned > 0 {
            tracing::info!(pruned, "old pending operations removed");
        }
        Ok(pruned)
    }

    /// Count one more failed attempt for each entry in `ids`
    pub async fn record_failures(&self, ids: &HashSet<Uuid>, at: DateTime<Utc>) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }

        let at = wire_precision(at);
        let mut log = self.log.lock().await;
        let mut next = log.clone();
        for op in next.iter_mut().filter(|op| ids.contains(&op.id)) {
            op.attempts = op.attempts.saturating_add(1);
            op.last_attempt_at = Some(at);
        }
        self.persist(&next).await?;
        *log = next;
        Ok(())
    }

    /// Drop every entry and the storage key
    pub async fn clear(&self) -> Result<(), SyncError> {
        let mut log = self.log.lock().await;
        self.storage.remove(&self.key).await?;
        log.clear();
        Ok(())
    }

    async fn retain<F>(&self, keep: F) -> Result<usize, SyncError>
    where
        F: Fn(&PendingOperation) -> bool,
    {
        let mut log = self.log.lock().await;
        let next: Vec<PendingOperation> = log.iter().filter(|op| keep(op)).cloned().collect();
        let removed = log.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(&next).await?;
        *log = next;
        Ok(removed)
    }

    async fn persist(&self, entries: &[PendingOperation]) -> Result<(), SyncError> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| SyncError::persistence(format!("cannot serialize pending log: {}", e)))?;
        self.storage.set(&self.key, &raw).await?;
        Ok(())
    }
}
