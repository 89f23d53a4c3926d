//! Coin ledger.
//!
//! This module implements the balance engine:
//! - Transaction types and the credit/debit classification table
//! - The pending → posted | rejected state machine
//! - Posting rules (overdraft refusal)
//! - Balance and history reads

pub mod classification;
pub mod error;
pub mod posting;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod service_tests;

pub use classification::{CLASSIFICATION, Direction, credit_types, debit_types, net_of};
pub use error::LedgerError;
pub use posting::{PostingPlan, PostingRules};
pub use service::LedgerService;
pub use types::{
    Account, AccountTypeTotal, BalanceSummary, HistoryFilter, LedgerTransaction, NewTransaction,
    TransactionStatus, TransactionType, TypeTotal,
};
