//! Storage-specific error types.
//!
//! All storage operations return [`StoreError`] on failure, which can be
//! matched to determine the underlying cause (connection, query, data).

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connecting to the database took too long.
    #[error("database connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Invalid data in database (e.g., unparseable timestamp).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
