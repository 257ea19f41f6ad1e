//! # Offline Write Queue
//!
//! Mutations made while the API is unreachable are appended to a durable
//! log and replayed later by the sync coordinator.
//!
//! ## Key Components
//!
//! - `queue.rs`: the pending-operation store
//! - `retry.rs`: dead-letter threshold and backoff between attempts

pub mod queue;
pub mod retry;

pub use queue::{Mutation, OperationKind, PendingOperation, PendingStore};
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
