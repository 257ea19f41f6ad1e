//! Shared Error Types
//!
//! Errors raised by the offline queue, the storage backends and the replay
//! of queued operations against the remote API.
//!
//! # Error Categories
//!
//! - `Persistence` - the local storage medium refused a write or read
//! - `Network` / `HttpStatus` / `Timeout` - the remote call failed
//! - `Translation` - a queued entry cannot be turned into a request
//! - `Validation` - a caller handed the queue an unusable value
//! - `Serialization` - JSON encoding or decoding failed
//!
//! # Usage
//!
//! ```rust
//! use babysync::shared::error::SyncError;
//!
//! let error = SyncError::translation("CREATE entry has no payload");
//! assert!(!error.is_retryable());
//! ```
use thiserror::Error;

/// Errors produced by the offline write-queue
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Local storage write or read failed (quota, corruption, I/O)
    #[error("Persistence error: {message}")]
    Persistence {
        /// Human-readable error message
        message: String,
    },

    /// The remote call could not be completed
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
    },

    /// The remote API answered with a non-2xx status
    #[error("HTTP error! status: {status}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
    },

    /// The remote call exceeded the configured per-call timeout
    #[error("Request timed out after {millis} ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds
        millis: u64,
    },

    /// A queued entry cannot be translated into a request
    #[error("Translation error: {message}")]
    Translation {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a new persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new translation error
    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether a later drain may succeed where this one failed.
    ///
    /// Translation failures come from the entry itself and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::translation(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
