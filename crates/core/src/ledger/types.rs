//! Ledger domain types.
//!
//! Accounts hold one balance per employee; ledger transactions are the
//! append-only log of proposed balance changes and their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kudos_shared::types::{AccountId, Coins, EmployeeId, TransactionId, WellnessSubmissionId};

use crate::ledger::classification::Direction;
use crate::ledger::error::LedgerError;

/// The closed set of balance-affecting event kinds.
///
/// Whether a type credits or debits is decided solely by
/// [`TransactionType::direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Coins awarded by a manager out of their allotment.
    ManagerAward,
    /// Incoming leg of a peer transfer (also used for escrow refunds).
    PeerTransferReceived,
    /// Reward for an approved wellness task submission.
    WellnessReward,
    /// Administrative correction that adds coins.
    AdjustmentCredit,
    /// Coins loaded by a bulk import job.
    BulkImport,
    /// Mini-game payout.
    GameWin,
    /// Returned mini-game stake.
    GameRefund,
    /// Jackpot payout.
    JackpotWin,
    /// Daily login bonus.
    DailyBonus,
    /// Prediction market payout.
    PredictionWin,
    /// Outgoing leg of a peer transfer (or an escrow for an unregistered recipient).
    PeerTransferSent,
    /// Store checkout.
    StorePurchase,
    /// Mini-game stake.
    GameBet,
    /// Contribution into a jackpot pool.
    JackpotContribution,
    /// Personal coins moved into the manager's award allotment.
    AllotmentDeposit,
    /// Prediction market stake.
    PredictionBet,
    /// Administrative correction that removes coins.
    AdjustmentDebit,
}

impl TransactionType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 17] = [
        Self::ManagerAward,
        Self::PeerTransferReceived,
        Self::WellnessReward,
        Self::AdjustmentCredit,
        Self::BulkImport,
        Self::GameWin,
        Self::GameRefund,
        Self::JackpotWin,
        Self::DailyBonus,
        Self::PredictionWin,
        Self::PeerTransferSent,
        Self::StorePurchase,
        Self::GameBet,
        Self::JackpotContribution,
        Self::AllotmentDeposit,
        Self::PredictionBet,
        Self::AdjustmentDebit,
    ];

    /// Returns the wire/storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManagerAward => "manager_award",
            Self::PeerTransferReceived => "peer_transfer_received",
            Self::WellnessReward => "wellness_reward",
            Self::AdjustmentCredit => "adjustment_credit",
            Self::BulkImport => "bulk_import",
            Self::GameWin => "game_win",
            Self::GameRefund => "game_refund",
            Self::JackpotWin => "jackpot_win",
            Self::DailyBonus => "daily_bonus",
            Self::PredictionWin => "prediction_win",
            Self::PeerTransferSent => "peer_transfer_sent",
            Self::StorePurchase => "store_purchase",
            Self::GameBet => "game_bet",
            Self::JackpotContribution => "jackpot_contribution",
            Self::AllotmentDeposit => "allotment_deposit",
            Self::PredictionBet => "prediction_bet",
            Self::AdjustmentDebit => "adjustment_debit",
        }
    }

    /// Parses a storage name. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == lowered)
    }

    /// Human-readable fallback description.
    #[must_use]
    pub fn default_description(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| LedgerError::UnknownTransactionType(s.to_string()))
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a ledger transaction.
///
/// The only valid transitions are:
/// - Pending → Posted (post)
/// - Pending → Rejected (reject)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Created, no balance effect yet.
    Pending,
    /// Applied to the account balance (immutable).
    Posted,
    /// Discarded without balance effect (immutable).
    Rejected,
}

impl TransactionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Posted => "posted",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "posted" => Some(Self::Posted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns true once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Rejected)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One coin account per employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID.
    pub id: AccountId,
    /// Owning employee (unique).
    pub employee_id: EmployeeId,
    /// Spendable balance; equals the signed sum of posted transactions.
    pub balance: Coins,
    /// Remaining award budget of the manager's latest allotment period.
    /// Display mirror only; the allotment row is authoritative.
    pub allotment_balance: Coins,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Builds a fresh zero-balance account.
    #[must_use]
    pub fn open(employee_id: EmployeeId, at: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            employee_id,
            balance: Coins::ZERO,
            allotment_balance: Coins::ZERO,
            created_at: at,
            updated_at: at,
        }
    }
}

/// A ledger entry and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Transaction ID (UUID v7).
    pub id: TransactionId,
    /// Account whose balance this entry affects.
    pub account_id: AccountId,
    /// Event kind; decides the sign.
    pub transaction_type: TransactionType,
    /// Positive magnitude. Never signed.
    pub amount: Coins,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Free-text description.
    pub description: String,
    /// Employee the coins came from, for transfers and awards.
    pub source_employee_id: Option<EmployeeId>,
    /// Employee the coins went to, for transfers and awards.
    pub target_employee_id: Option<EmployeeId>,
    /// Wellness submission this entry rewards (at most one entry each).
    pub wellness_submission_id: Option<WellnessSubmissionId>,
    /// Reason recorded on rejection.
    pub rejection_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when posted.
    pub posted_at: Option<DateTime<Utc>>,
    /// Set when rejected.
    pub rejected_at: Option<DateTime<Utc>>,
}

impl LedgerTransaction {
    /// Credit or debit, from the classification table.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.transaction_type.direction()
    }

    /// The balance delta this entry applies when posted.
    #[must_use]
    pub fn signed_amount(&self) -> Coins {
        self.direction().apply(self.amount)
    }
}

/// Input for creating a pending ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Account to affect.
    pub account_id: AccountId,
    /// Event kind.
    pub transaction_type: TransactionType,
    /// Positive magnitude.
    pub amount: Coins,
    /// Optional description; defaults to the type name.
    pub description: Option<String>,
    /// Provenance: sender / awarding manager.
    pub source_employee_id: Option<EmployeeId>,
    /// Provenance: recipient.
    pub target_employee_id: Option<EmployeeId>,
    /// Wellness submission being rewarded.
    pub wellness_submission_id: Option<WellnessSubmissionId>,
}

impl NewTransaction {
    /// Starts a new transaction input.
    #[must_use]
    pub fn new(account_id: AccountId, transaction_type: TransactionType, amount: Coins) -> Self {
        Self {
            account_id,
            transaction_type,
            amount,
            description: None,
            source_employee_id: None,
            target_employee_id: None,
            wellness_submission_id: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the source employee.
    #[must_use]
    pub fn from_employee(mut self, employee_id: EmployeeId) -> Self {
        self.source_employee_id = Some(employee_id);
        self
    }

    /// Sets the target employee.
    #[must_use]
    pub fn to_employee(mut self, employee_id: EmployeeId) -> Self {
        self.target_employee_id = Some(employee_id);
        self
    }

    /// Links a wellness submission.
    #[must_use]
    pub fn for_submission(mut self, submission_id: WellnessSubmissionId) -> Self {
        self.wellness_submission_id = Some(submission_id);
        self
    }

    /// Materialises the pending row.
    #[must_use]
    pub fn into_pending(self, at: DateTime<Utc>) -> LedgerTransaction {
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| self.transaction_type.default_description());
        LedgerTransaction {
            id: TransactionId::new(),
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount: self.amount,
            status: TransactionStatus::Pending,
            description,
            source_employee_id: self.source_employee_id,
            target_employee_id: self.target_employee_id,
            wellness_submission_id: self.wellness_submission_id,
            rejection_reason: None,
            created_at: at,
            posted_at: None,
            rejected_at: None,
        }
    }
}

/// Balance view returned by `get_balance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Account ID.
    pub account_id: AccountId,
    /// Stored balance (sum of posted entries).
    pub posted: Coins,
    /// Net of pending credits and debits; zero when pending was not requested.
    pub pending: Coins,
    /// `posted + pending`.
    pub total: Coins,
}

/// Filters for `get_history`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Only this status.
    pub status: Option<TransactionStatus>,
    /// Only these types; empty means all.
    pub transaction_types: Vec<TransactionType>,
    /// Created at or after.
    pub created_from: Option<DateTime<Utc>>,
    /// Created strictly before.
    pub created_to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    /// Returns true if `tx` passes every filter.
    #[must_use]
    pub fn matches(&self, tx: &LedgerTransaction) -> bool {
        self.status.is_none_or(|s| s == tx.status)
            && (self.transaction_types.is_empty()
                || self.transaction_types.contains(&tx.transaction_type))
            && self.created_from.is_none_or(|from| tx.created_at >= from)
            && self.created_to.is_none_or(|to| tx.created_at < to)
    }
}

/// Aggregate amount for one transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTotal {
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Sum of amounts.
    pub total: Coins,
}

/// Aggregate amount for one (account, type) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountTypeTotal {
    /// Account ID.
    pub account_id: AccountId,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Sum of amounts.
    pub total: Coins,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_type_round_trips_through_storage_name() {
        for t in TransactionType::ALL {
            assert_eq!(TransactionType::parse(t.as_str()), Some(t));
            assert_eq!(t.as_str().parse::<TransactionType>().unwrap(), t);
        }
        assert_eq!(
            TransactionType::parse("STORE_PURCHASE"),
            Some(TransactionType::StorePurchase)
        );
    }

    #[test]
    fn test_unknown_type_is_a_validation_error() {
        let err = "adjustment".parse::<TransactionType>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownTransactionType(ref s) if s == "adjustment"));
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_status_parse_and_terminal() {
        assert_eq!(TransactionStatus::parse("Posted"), Some(TransactionStatus::Posted));
        assert_eq!(TransactionStatus::parse("voided"), None);
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Posted.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert_eq!(TransactionStatus::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_into_pending_defaults_description() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let tx = NewTransaction::new(AccountId::new(), TransactionType::DailyBonus, Coins::from_minor(500))
            .with_description("  ")
            .into_pending(at);
        assert_eq!(tx.description, "daily bonus");
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.created_at, at);
        assert!(tx.posted_at.is_none());
    }

    #[test]
    fn test_history_filter_matches() {
        let at = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap();
        let tx = NewTransaction::new(AccountId::new(), TransactionType::GameBet, Coins::from_minor(100))
            .into_pending(at);

        assert!(HistoryFilter::default().matches(&tx));
        assert!(HistoryFilter {
            status: Some(TransactionStatus::Pending),
            transaction_types: vec![TransactionType::GameBet, TransactionType::GameWin],
            created_from: Some(at),
            created_to: Some(at + chrono::Duration::seconds(1)),
        }
        .matches(&tx));
        assert!(!HistoryFilter {
            created_to: Some(at),
            ..HistoryFilter::default()
        }
        .matches(&tx));
        assert!(!HistoryFilter {
            status: Some(TransactionStatus::Posted),
            ..HistoryFilter::default()
        }
        .matches(&tx));
    }
}
