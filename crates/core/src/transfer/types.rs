//! Pending transfer domain types.

use std::fmt;

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use kudos_shared::types::{
    AccountId, Coins, EmployeeId, ImportJobId, PendingTransferId, TransactionId,
};

use crate::ledger::LedgerTransaction;

/// Lifecycle of an escrowed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingTransferStatus {
    /// Coins are held in escrow.
    Pending,
    /// Delivered to the recipient.
    Claimed,
    /// Returned to the sender.
    Cancelled,
}

impl PendingTransferStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for PendingTransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coins addressed to an email that had no employee when they were sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    /// Transfer ID.
    pub id: PendingTransferId,
    /// Sender.
    pub sender_employee_id: EmployeeId,
    /// Sender's account, debited at creation.
    pub sender_account_id: AccountId,
    /// Normalised recipient email.
    pub recipient_email: String,
    /// Escrowed amount.
    pub amount: Coins,
    /// Optional note from the sender.
    pub message: Option<String>,
    /// The `peer_transfer_sent` escrow entry.
    pub sender_transaction_id: TransactionId,
    /// Lifecycle status.
    pub status: PendingTransferStatus,
    /// Bulk import job that created it, if any.
    pub import_job_id: Option<ImportJobId>,
    /// Recipient account, set on claim.
    pub recipient_account_id: Option<AccountId>,
    /// The `peer_transfer_received` entry, set on claim.
    pub recipient_transaction_id: Option<TransactionId>,
    /// Compensating refund entry, set on cancel of a posted escrow.
    pub refund_transaction_id: Option<TransactionId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Claim or cancel timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Input for escrowing coins to an email address.
#[derive(Debug, Clone, Validate)]
pub struct NewPendingTransfer {
    /// Account to debit.
    #[garde(skip)]
    pub sender_account_id: AccountId,
    /// Recipient email; normalised before storage.
    #[garde(email)]
    pub recipient_email: String,
    /// Amount to escrow.
    #[garde(skip)]
    pub amount: Coins,
    /// Optional note.
    #[garde(length(max = 500))]
    pub message: Option<String>,
    /// Idempotency key for bulk imports.
    #[garde(skip)]
    pub import_job_id: Option<ImportJobId>,
}

/// One transfer that could not be claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimFailure {
    /// The transfer.
    pub transfer_id: PendingTransferId,
    /// Rendered error.
    pub reason: String,
}

/// Outcome of claiming every pending transfer for an email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimReport {
    /// Transfers delivered by this call.
    pub claimed: Vec<PendingTransferId>,
    /// Transfers already resolved by a concurrent call.
    pub skipped: Vec<PendingTransferId>,
    /// Transfers that failed and remain pending.
    pub failed: Vec<ClaimFailure>,
}

impl ClaimReport {
    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Recipient was registered; both legs were posted.
    Direct {
        /// The sender's `peer_transfer_sent` entry.
        sent: LedgerTransaction,
        /// The recipient's `peer_transfer_received` entry.
        received: LedgerTransaction,
    },
    /// Recipient was unknown; the coins are in escrow.
    Escrowed(PendingTransfer),
}

/// Money currently held in escrow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EscrowSummary {
    /// Number of pending transfers.
    pub count: u64,
    /// Sum of their amounts.
    pub amount: Coins,
}

/// Normalises an email for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
