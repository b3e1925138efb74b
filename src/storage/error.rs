//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (database, serialization,
//! rejected query input).

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller-supplied query input was rejected (invalid range, bad filter).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid data in database (e.g., unknown enum value).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
