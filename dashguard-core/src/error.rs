//! Core error types for `DashGuard`.

use thiserror::Error;

/// Core error type for `DashGuard` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The payload has no `data` field.
    #[error("Payload has no data field")]
    MissingData,

    /// Invalid data in an upstream response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
