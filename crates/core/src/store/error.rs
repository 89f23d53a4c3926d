//! Persistence errors surfaced through the store traits.

use thiserror::Error;

use kudos_shared::AppError;

use crate::retry::Retryable;

/// Errors raised by a [`LedgerStore`](super::LedgerStore) or its units of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The unit of work lost a serialization race and was rolled back.
    #[error("Serialization failure, the unit of work may be retried")]
    SerializationFailure,

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Any other backend failure.
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SerializationFailure => "SERIALIZATION_FAILURE",
            Self::UniqueViolation(_) => "UNIQUE_VIOLATION",
            Self::Backend(_) => "DATABASE_ERROR",
        }
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::SerializationFailure)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(_) => Self::Conflict(err.to_string()),
            StoreError::SerializationFailure | StoreError::Backend(_) => {
                Self::Database(err.to_string())
            }
        }
    }
}
