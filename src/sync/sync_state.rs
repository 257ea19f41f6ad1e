//! # Sync Status
//!
//! UI-facing snapshot: how many changes are still unsynchronized, whether a
//! drain is running, and what the connection looks like.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub pending_count: usize,
    pub dead_letter_count: usize,
    pub is_syncing: bool,
    pub is_online: bool,
    pub is_slow_connection: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Whether the user has changes the server has not seen
    pub fn has_unsynced_changes(&self) -> bool {
        self.pending_count > 0
    }
}
