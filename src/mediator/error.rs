use thiserror::Error;

use crate::auth::VerifyError;
use crate::schema::ValidationError;
use crate::store::StoreError;

/// Pipeline stage a request had reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Authenticated,
    Authorized,
    Executed,
    Responded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Authenticated => "authenticated",
            Stage::Authorized => "authorized",
            Stage::Executed => "executed",
            Stage::Responded => "responded",
        }
    }
}

/// Terminal outcome of a failed request. Every gate maps its failure to
/// exactly one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MediatorError {
    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Revision conflict: expected {expected}, current {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ValidationError> for MediatorError {
    fn from(err: ValidationError) -> Self {
        MediatorError::Validation(err)
    }
}

impl From<VerifyError> for MediatorError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Timeout => MediatorError::Timeout(err.to_string()),
            VerifyError::Unavailable(_) => MediatorError::Internal(err.to_string()),
            other => MediatorError::Unauthenticated(other.to_string()),
        }
    }
}

impl From<StoreError> for MediatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => MediatorError::NotFound(err.to_string()),
            StoreError::Conflict { expected, actual } => MediatorError::Conflict { expected, actual },
            StoreError::Timeout(_) => MediatorError::Timeout(err.to_string()),
            StoreError::Backend(_) => MediatorError::Internal(err.to_string()),
        }
    }
}
