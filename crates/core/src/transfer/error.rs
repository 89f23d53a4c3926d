//! Pending transfer error types.

use thiserror::Error;

use kudos_shared::AppError;
use kudos_shared::types::{EmployeeId, PendingTransferId, TransactionId};

use super::types::PendingTransferStatus;
use crate::directory::DirectoryError;
use crate::ledger::LedgerError;
use crate::retry::Retryable;
use crate::store::StoreError;

/// Errors that can occur while escrowing, claiming or cancelling transfers.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed request (email, message length).
    #[error("Invalid transfer request: {0}")]
    Validation(String),

    /// Only the sender may cancel.
    #[error("Employee {requester} may not cancel transfer {transfer_id}")]
    Forbidden {
        /// The transfer.
        transfer_id: PendingTransferId,
        /// Who asked.
        requester: EmployeeId,
    },

    /// The transfer has already been claimed or cancelled.
    #[error("Transfer {transfer_id} is {status}, not pending")]
    InvalidState {
        /// The transfer.
        transfer_id: PendingTransferId,
        /// Its current status.
        status: PendingTransferStatus,
    },

    /// Transfer not found.
    #[error("Pending transfer not found: {0}")]
    NotFound(PendingTransferId),

    /// No employee is registered under the email yet.
    #[error("No employee is registered for {0}")]
    RecipientNotRegistered(String),

    /// Sender and recipient are the same employee.
    #[error("Cannot transfer coins to yourself")]
    SelfTransfer,

    /// The escrow entry was rejected out of band; the transfer cannot be claimed.
    #[error("Escrow transaction {transaction_id} for transfer {transfer_id} was rejected")]
    EscrowRejected {
        /// The transfer.
        transfer_id: PendingTransferId,
        /// The sender-side entry.
        transaction_id: TransactionId,
    },

    /// Employee directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransferError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::NotFound(_) => "TRANSFER_NOT_FOUND",
            Self::RecipientNotRegistered(_) => "RECIPIENT_NOT_REGISTERED",
            Self::SelfTransfer => "SELF_TRANSFER",
            Self::EscrowRejected { .. } => "ESCROW_REJECTED",
            Self::Directory(_) => "DIRECTORY_UNAVAILABLE",
            Self::Ledger(err) => err.error_code(),
            Self::Store(err) => err.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::SelfTransfer => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound(_) | Self::RecipientNotRegistered(_) => 404,
            Self::InvalidState { .. } | Self::EscrowRejected { .. } => 409,
            Self::Directory(_) => 503,
            Self::Ledger(err) => err.http_status_code(),
            Self::Store(StoreError::SerializationFailure | StoreError::UniqueViolation(_)) => 409,
            Self::Store(StoreError::Backend(_)) => 500,
        }
    }
}

impl Retryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(err) => err.is_retryable(),
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Validation(_) | TransferError::SelfTransfer => {
                Self::Validation(err.to_string())
            }
            TransferError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            TransferError::NotFound(_) | TransferError::RecipientNotRegistered(_) => {
                Self::NotFound(err.to_string())
            }
            TransferError::InvalidState { .. } | TransferError::EscrowRejected { .. } => {
                Self::Conflict(err.to_string())
            }
            TransferError::Directory(_) => Self::Internal(err.to_string()),
            TransferError::Ledger(ledger) => ledger.into(),
            TransferError::Store(store) => store.into(),
        }
    }
}

impl From<garde::Report> for TransferError {
    fn from(report: garde::Report) -> Self {
        Self::Validation(report.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        TransferError::Forbidden { transfer_id: PendingTransferId::new(), requester: EmployeeId::new() },
        403,
        "FORBIDDEN"
    )]
    #[case(
        TransferError::InvalidState { transfer_id: PendingTransferId::new(), status: PendingTransferStatus::Claimed },
        409,
        "CONFLICT"
    )]
    #[case(TransferError::RecipientNotRegistered("a@b.c".into()), 404, "NOT_FOUND")]
    #[case(TransferError::SelfTransfer, 400, "VALIDATION_ERROR")]
    fn test_app_error_mapping(#[case] err: TransferError, #[case] status: u16, #[case] app_code: &str) {
        assert_eq!(err.http_status_code(), status);
        assert_eq!(AppError::from(err).error_code(), app_code);
    }

    #[test]
    fn test_retry_delegates_to_store() {
        assert!(TransferError::Store(StoreError::SerializationFailure).is_retryable());
        assert!(!TransferError::SelfTransfer.is_retryable());
    }
}
