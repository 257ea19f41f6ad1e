//! babysync - offline write-queue for the baby-care event tracker
//!
//! Caregivers log events (feedings, diapers, sleep, medication…) even when
//! the phone has no signal. Every write is appended to a durable pending
//! log and replayed against the REST API once connectivity returns.
//!
//! # Module Structure
//!
//! - **`shared`** - error taxonomy and configuration
//! - **`storage`** - key-value namespace the pending log is persisted in
//!   (in-memory and SQLite backends)
//! - **`offline`** - the pending-operation store and the retry policy
//! - **`api`** - request translation, HTTP transport, typed event writes
//! - **`sync`** - coordinator, connectivity observer, periodic scheduler and
//!   the `SyncService` that wires them
//!
//! # Delivery Guarantees
//!
//! Replay is best-effort and at-least-once. Entries are replayed one at a
//! time in enqueue order; a failed entry stays queued for the next drain and
//! later entries on the same target wait behind it. Entries older than the
//! retention window (7 days by default) are pruned at startup whether they
//! were synced or not.
//!
//! # Thread Safety
//!
//! The pending log is guarded by a single async mutex; the coordinator's
//! single-flight flag keeps overlapping drains from double-sending.

/// Shared types: errors and configuration
pub mod shared;

/// Key-value storage backends
pub mod storage;

/// Pending-operation store and retry policy
pub mod offline;

/// Remote API translation and transport
pub mod api;

/// Background synchronization
pub mod sync;

pub use shared::{ConfigError, SyncConfig, SyncError};
