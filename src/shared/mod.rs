//! Shared Module
//!
//! Types used by every layer of the queue: the error taxonomy and the
//! configuration.

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

pub use config::{ConfigError, ProbeConfig, SyncConfig, SyncConfigBuilder};
pub use error::SyncError;
