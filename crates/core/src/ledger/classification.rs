//! Credit/debit classification of transaction types.
//!
//! [`TransactionType::direction`] is the single source of truth. Balance
//! computation, pending totals and reconciliation all go through it.

use serde::{Deserialize, Serialize};

use kudos_shared::types::Coins;

use crate::ledger::types::{TransactionType, TypeTotal};

/// Whether a transaction increases or decreases the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Increases the balance.
    Credit,
    /// Decreases the balance.
    Debit,
}

impl Direction {
    /// Applies the sign to a positive magnitude.
    #[must_use]
    pub fn apply(self, amount: Coins) -> Coins {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }
}

impl TransactionType {
    /// Credit or debit.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::ManagerAward
            | Self::PeerTransferReceived
            | Self::WellnessReward
            | Self::AdjustmentCredit
            | Self::BulkImport
            | Self::GameWin
            | Self::GameRefund
            | Self::JackpotWin
            | Self::DailyBonus
            | Self::PredictionWin => Direction::Credit,
            Self::PeerTransferSent
            | Self::StorePurchase
            | Self::GameBet
            | Self::JackpotContribution
            | Self::AllotmentDeposit
            | Self::PredictionBet
            | Self::AdjustmentDebit => Direction::Debit,
        }
    }

    /// Returns true for credit types.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self.direction(), Direction::Credit)
    }
}

/// The classification table as data, one row per transaction type.
pub const CLASSIFICATION: [(TransactionType, Direction); TransactionType::ALL.len()] = {
    let mut table = [(TransactionType::ManagerAward, Direction::Credit); TransactionType::ALL.len()];
    let mut i = 0;
    while i < TransactionType::ALL.len() {
        let t = TransactionType::ALL[i];
        table[i] = (t, t.direction());
        i += 1;
    }
    table
};

/// All credit types.
#[must_use]
pub fn credit_types() -> Vec<TransactionType> {
    TransactionType::ALL
        .into_iter()
        .filter(TransactionType::is_credit)
        .collect()
}

/// All debit types.
#[must_use]
pub fn debit_types() -> Vec<TransactionType> {
    TransactionType::ALL
        .into_iter()
        .filter(|t| !t.is_credit())
        .collect()
}

/// Signed sum of per-type totals: credits minus debits.
pub fn net_of<'a>(totals: impl IntoIterator<Item = &'a TypeTotal>) -> Coins {
    totals
        .into_iter()
        .map(|t| t.transaction_type.direction().apply(t.total))
        .sum()
}
