use scimq::NormalizeError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// No index can serve a product containing this attribute, and table
    /// scans are disabled.
    #[error("no usable index for attribute \"{attribute}\" and table scans are disabled")]
    UnindexableTerm { attribute: String },
    #[error(transparent)]
    ExpressionTooComplex(#[from] NormalizeError),
}
