use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store shed load; retriable after a backoff.
    #[error("throttled by the store")]
    Throttled { retry_after: Option<Duration> },
    /// A transient fault (connection reset, attempt timeout); retriable.
    #[error("transient store failure: {0}")]
    Transient(String),
    /// A conditional write found the condition violated.
    #[error("conditional check failed on \"{attribute}\"")]
    ConditionFailed { attribute: String },
    /// The request itself is malformed (unknown table, bad expression).
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("store backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self { StoreError::Validation(message.into()) }

    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Throttled { .. } | StoreError::Transient(_))
    }
}
