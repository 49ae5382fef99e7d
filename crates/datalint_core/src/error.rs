//! Error types for dataset inspection.
//!
//! Only failures that stop an inspection live here: unreadable artifacts,
//! artifacts no detector recognizes, invalid cache configuration, timeouts
//! and cancellation. Malformed content is not an error; it is reported through
//! [`ValidationStatus`](crate::ValidationStatus) and diagnostics.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for datalint operations.
pub type Result<T> = std::result::Result<T, DatalintError>;

/// Main error type for datalint operations.
///
/// The type is `Clone` so that one failed computation can be handed to every
/// caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum DatalintError {
    /// The artifact could not be opened or read
    #[error("Failed to read artifact '{artifact}': {source}")]
    Read {
        /// Artifact display name
        artifact: String,
        /// Underlying I/O failure
        #[source]
        source: Arc<std::io::Error>,
    },

    /// No format detector matched the artifact
    #[error("Unrecognized dataset format for '{artifact}': {reason}")]
    UnrecognizedFormat {
        /// Artifact display name
        artifact: String,
        /// Why every detector declined
        reason: String,
    },

    /// Cache configuration rejected at construction time
    #[error("Invalid cache configuration: {0}")]
    CacheConfig(String),

    /// The inspection did not finish within the configured timeout
    #[error("Inspection of '{artifact}' timed out after {timeout:?}")]
    Timeout {
        /// Artifact display name
        artifact: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// The inspection was cancelled by the caller
    #[error("Inspection cancelled")]
    Cancelled,

    /// A cache snapshot could not be written or decoded
    #[error("Cache snapshot error: {0}")]
    Snapshot(String),

    /// Unexpected internal failure (e.g. a worker panicked)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatalintError {
    /// Creates a read error for the named artifact.
    pub fn read(artifact: impl Into<String>, source: std::io::Error) -> Self {
        Self::Read {
            artifact: artifact.into(),
            source: Arc::new(source),
        }
    }

    /// Creates an unrecognized-format error.
    pub fn unrecognized(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnrecognizedFormat {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cache configuration error.
    pub fn cache_config(message: impl Into<String>) -> Self {
        Self::CacheConfig(message.into())
    }

    /// Creates a timeout error.
    pub fn timeout(artifact: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            artifact: artifact.into(),
            timeout,
        }
    }

    /// Creates a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true for content-shape outcomes that batch callers should
    /// record and move past.
    pub fn is_content_error(&self) -> bool {
        matches!(self, Self::UnrecognizedFormat { .. })
    }
}

impl From<serde_json::Error> for DatalintError {
    fn from(err: serde_json::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}
