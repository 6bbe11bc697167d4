use dynaq_planner::PlanError;
use dynaq_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// The store kept throttling past the configured retry attempts.
    #[error("store throttled the call")]
    Throttled,
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("call deadline exceeded")]
    DeadlineExceeded,
    #[error("call cancelled")]
    Cancelled,
    /// The deployment lacks an index this operation needs.
    #[error("operation \"{operation}\" is not supported by this store deployment")]
    Unsupported { operation: &'static str },
    /// A store-side invariant was violated (duplicate unique attribute,
    /// failed write precondition).
    #[error("integrity violation on attribute \"{attribute}\"")]
    Integrity { attribute: String },
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    /// The plan references something the capabilities cannot render.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl ExecError {
    pub(crate) fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::Throttled { .. } => ExecError::Throttled,
            StoreError::Transient(message) => ExecError::Transient(message),
            StoreError::ConditionFailed { attribute } => ExecError::Integrity { attribute },
            other => ExecError::Store(other),
        }
    }
}
