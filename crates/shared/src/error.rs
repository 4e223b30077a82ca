//! Error types for Gatewiki storage

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
            StoreError::Unreachable(err.to_string())
        } else {
            StoreError::Internal(err.to_string())
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
