//! Error types for backsync-sync.

use std::time::Duration;

use thiserror::Error;

/// Failure of a call against the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the Redis client (connection, auth, script, type).
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be read as the expected type.
    #[error("malformed value in `{structure}` for `{field}`: {value}")]
    Malformed {
        structure: String,
        field: String,
        value: String,
    },
}

/// All errors surfaced by [`crate::Manager`] operations.
///
/// Every variant is transport-class: nothing is retried internally, and a
/// failed call must not be assumed to have had any effect.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store call itself failed.
    #[error("store error during {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    /// The store call did not complete within the configured deadline.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

impl SyncError {
    pub fn op(&self) -> &'static str {
        match self {
            SyncError::Transport { op, .. } | SyncError::Timeout { op, .. } => op,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
