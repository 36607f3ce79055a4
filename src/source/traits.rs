//! Core source traits and types.

use crate::reading::{Reading, ReadingError};
use thiserror::Error;

/// Errors that can occur while fetching a reading.
///
/// Every variant is non-fatal: the poll loop logs it and skips the tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Timeout elapsed.
    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Upstream answered with a non-2xx status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Response body could not be interpreted.
    #[error("malformed response body: {0}")]
    Body(String),

    /// Response values are outside the valid range.
    #[error("invalid reading: {0}")]
    Invalid(#[from] ReadingError),
}

/// A remote data source that yields one reading per call.
///
/// # Error Handling
///
/// `fetch()` never retries internally; a failure costs exactly one tick.
/// Implementations must bound each call with a hard timeout shorter than the
/// poll interval.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync + 'static {
    /// Human-readable identifier used in logs.
    fn name(&self) -> &str;

    /// Fetch the current reading, stamped with the local process time.
    async fn fetch(&self) -> Result<Reading, FetchError>;
}
