//! Ledger error types for validation, state and funds errors.

use rust_decimal::Decimal;
use thiserror::Error;

use kudos_shared::AppError;
use kudos_shared::types::{AccountId, Coins, CoinsError, TransactionId, WellnessSubmissionId};

use crate::ledger::types::TransactionStatus;
use crate::retry::Retryable;
use crate::store::StoreError;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Amount must be strictly positive.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Coins),

    /// Amount has more than two decimal places.
    #[error("Amount {0} has more than two decimal places")]
    ExcessPrecision(Decimal),

    /// Transaction type is not in the classification table.
    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(String),

    /// An adjustment of zero coins has no direction.
    #[error("Adjustment amount cannot be zero")]
    ZeroAdjustment,

    // ========== State Errors ==========
    /// The transaction has already been posted or rejected.
    #[error("Transaction {transaction_id} is not pending (status: {status})")]
    NotPending {
        /// The transaction ID.
        transaction_id: TransactionId,
        /// Its current status.
        status: TransactionStatus,
    },

    /// A reward already exists for this wellness submission.
    #[error("Wellness submission {0} has already been rewarded")]
    DuplicateWellnessReward(WellnessSubmissionId),

    // ========== Business Errors ==========
    /// Posting the debit would take the balance below zero.
    #[error("Insufficient funds in account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        /// The account ID.
        account_id: AccountId,
        /// Debit amount.
        requested: Coins,
        /// Balance at the time of the check.
        available: Coins,
    },

    // ========== Lookup Errors ==========
    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    // ========== Store Errors ==========
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::ExcessPrecision(_) => "EXCESS_PRECISION",
            Self::UnknownTransactionType(_) => "UNKNOWN_TRANSACTION_TYPE",
            Self::ZeroAdjustment => "ZERO_ADJUSTMENT",
            Self::NotPending { .. } => "NOT_PENDING",
            Self::DuplicateWellnessReward(_) => "DUPLICATE_WELLNESS_REWARD",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::Store(err) => err.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::NonPositiveAmount(_)
            | Self::ExcessPrecision(_)
            | Self::UnknownTransactionType(_)
            | Self::ZeroAdjustment => 400,

            // 404 Not Found
            Self::TransactionNotFound(_) | Self::AccountNotFound(_) => 404,

            // 409 Conflict - state errors
            Self::NotPending { .. }
            | Self::DuplicateWellnessReward(_)
            | Self::Store(StoreError::SerializationFailure | StoreError::UniqueViolation(_)) => 409,

            // 422 Unprocessable - expected business refusal
            Self::InsufficientFunds { .. } => 422,

            // 500 Internal Server Error
            Self::Store(StoreError::Backend(_)) => 500,
        }
    }
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}

impl From<CoinsError> for LedgerError {
    fn from(err: CoinsError) -> Self {
        match err {
            CoinsError::ExcessPrecision(value) => Self::ExcessPrecision(value),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NonPositiveAmount(_)
            | LedgerError::ExcessPrecision(_)
            | LedgerError::UnknownTransactionType(_)
            | LedgerError::ZeroAdjustment => Self::Validation(err.to_string()),
            LedgerError::NotPending { .. } | LedgerError::DuplicateWellnessReward(_) => {
                Self::Conflict(err.to_string())
            }
            LedgerError::InsufficientFunds { .. } => Self::BusinessRule(err.to_string()),
            LedgerError::TransactionNotFound(_) | LedgerError::AccountNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            LedgerError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(LedgerError::NonPositiveAmount(Coins::ZERO), "NON_POSITIVE_AMOUNT", 400)]
    #[case(LedgerError::ExcessPrecision(dec!(0.001)), "EXCESS_PRECISION", 400)]
    #[case(LedgerError::ZeroAdjustment, "ZERO_ADJUSTMENT", 400)]
    #[case(
        LedgerError::NotPending { transaction_id: TransactionId::new(), status: TransactionStatus::Posted },
        "NOT_PENDING",
        409
    )]
    #[case(
        LedgerError::InsufficientFunds {
            account_id: AccountId::new(),
            requested: Coins::from_minor(500),
            available: Coins::from_minor(100),
        },
        "INSUFFICIENT_FUNDS",
        422
    )]
    #[case(LedgerError::TransactionNotFound(TransactionId::new()), "TRANSACTION_NOT_FOUND", 404)]
    #[case(LedgerError::Store(StoreError::SerializationFailure), "SERIALIZATION_FAILURE", 409)]
    #[case(LedgerError::Store(StoreError::Backend("down".into())), "DATABASE_ERROR", 500)]
    fn test_error_codes(#[case] err: LedgerError, #[case] code: &str, #[case] status: u16) {
        assert_eq!(err.error_code(), code);
        assert_eq!(err.http_status_code(), status);
    }

    #[test]
    fn test_only_serialization_failures_are_retryable() {
        assert!(LedgerError::Store(StoreError::SerializationFailure).is_retryable());
        assert!(!LedgerError::ZeroAdjustment.is_retryable());
        assert!(
            !LedgerError::InsufficientFunds {
                account_id: AccountId::new(),
                requested: Coins::from_minor(1),
                available: Coins::ZERO,
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_app_error_mapping() {
        let app: AppError = LedgerError::InsufficientFunds {
            account_id: AccountId::new(),
            requested: Coins::from_minor(1),
            available: Coins::ZERO,
        }
        .into();
        assert_eq!(app.status_code(), 422);

        let app: AppError = LedgerError::Store(StoreError::SerializationFailure).into();
        assert!(app.is_retryable());

        let app: AppError = LedgerError::from(CoinsError::ExcessPrecision(dec!(1.234))).into();
        assert_eq!(app.error_code(), "VALIDATION_ERROR");
    }
}
