//! Peer transfers and the escrow for not-yet-registered recipients.

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::TransferError;
pub use service::TransferService;
pub use types::{
    ClaimFailure, ClaimReport, EscrowSummary, NewPendingTransfer, PendingTransfer,
    PendingTransferStatus, SendOutcome, normalize_email,
};
