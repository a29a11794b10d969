use thiserror::Error;

/// Errors surfaced by event-log storage drivers.
#[derive(Debug, Error)]
pub enum EventLogStoreError {
    /// The backing store failed to perform the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The ambient cancellation token was cancelled before the operation
    /// completed. Nothing was written.
    #[error("the operation was cancelled")]
    Cancelled,
}

/// Result type for event-log store operations.
pub type Result<T> = std::result::Result<T, EventLogStoreError>;
