//! Allotment error types.

use thiserror::Error;

use kudos_shared::AppError;
use kudos_shared::types::{Coins, EmployeeId};

use crate::ledger::LedgerError;
use crate::retry::Retryable;
use crate::store::StoreError;

/// Errors that can occur during allotment operations.
#[derive(Debug, Error)]
pub enum AllotmentError {
    /// The award is larger than what is left of the period budget.
    #[error("Budget exceeded for manager {manager_id}: requested {requested}, remaining {remaining}")]
    BudgetExceeded {
        /// The manager.
        manager_id: EmployeeId,
        /// Award amount.
        requested: Coins,
        /// Budget left in the period.
        remaining: Coins,
    },

    /// A budget change would leave less budget than has already been used.
    #[error("Budget {budget} would be below the {used} already awarded this period")]
    InsufficientBudget {
        /// Awarded so far in the period.
        used: Coins,
        /// Proposed budget.
        budget: Coins,
    },

    /// A budget can never be negative.
    #[error("Budget cannot be negative, got {0}")]
    NegativeBudget(Coins),

    /// Awards and fundings must be positive.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Coins),

    /// The clock is outside the representable calendar.
    #[error("No allotment period contains the current time")]
    PeriodOutOfRange,

    /// Ledger failure while posting.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllotmentError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::InsufficientBudget { .. } => "INSUFFICIENT_BUDGET",
            Self::NegativeBudget(_) => "NEGATIVE_BUDGET",
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::PeriodOutOfRange => "PERIOD_OUT_OF_RANGE",
            Self::Ledger(err) => err.error_code(),
            Self::Store(err) => err.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NegativeBudget(_) | Self::NonPositiveAmount(_) => 400,
            Self::BudgetExceeded { .. } | Self::InsufficientBudget { .. } => 422,
            Self::PeriodOutOfRange => 500,
            Self::Ledger(err) => err.http_status_code(),
            Self::Store(StoreError::SerializationFailure | StoreError::UniqueViolation(_)) => 409,
            Self::Store(StoreError::Backend(_)) => 500,
        }
    }
}

impl Retryable for AllotmentError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(err) => err.is_retryable(),
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<AllotmentError> for AppError {
    fn from(err: AllotmentError) -> Self {
        match err {
            AllotmentError::NegativeBudget(_) | AllotmentError::NonPositiveAmount(_) => {
                Self::Validation(err.to_string())
            }
            AllotmentError::BudgetExceeded { .. } | AllotmentError::InsufficientBudget { .. } => {
                Self::BusinessRule(err.to_string())
            }
            AllotmentError::PeriodOutOfRange => Self::Internal(err.to_string()),
            AllotmentError::Ledger(ledger) => ledger.into(),
            AllotmentError::Store(store) => store.into(),
        }
    }
}
