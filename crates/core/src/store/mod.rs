//! Persistence seams for the balance engine.
//!
//! Services never talk to a database directly. Reads go through
//! [`LedgerStore`]; every mutation happens inside a [`UnitOfWork`] obtained
//! from [`LedgerStore::begin`], which is one serializable transaction
//! boundary. Every `lock_*` method takes an exclusive row lock that is held
//! until the unit commits or is dropped.
//!
//! Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it
//! back.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kudos_shared::types::{
    AccountId, AllotmentId, Coins, EmployeeId, ImportJobId, PageRequest, PendingTransferId,
    TransactionId,
};

use crate::allotment::{ManagerAllotment, PeriodType};
use crate::ledger::{
    Account, AccountTypeTotal, HistoryFilter, LedgerTransaction, TransactionStatus, TypeTotal,
};
use crate::transfer::{EscrowSummary, PendingTransfer, PendingTransferStatus};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Everything a reconciliation run compares, as of one instant.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationSnapshot {
    /// Accounts in scope.
    pub accounts: Vec<Account>,
    /// Posted amounts per (account, type) for those accounts.
    pub posted_totals: Vec<AccountTypeTotal>,
    /// Transfers still held in escrow.
    pub escrow: EscrowSummary,
}

/// Read access and unit-of-work factory.
///
/// Reads may run at a weaker isolation level than units of work; they are
/// used for display and reconciliation only, never for a decision that
/// leads to a write.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a serializable unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Loads an account.
    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Loads the account owned by an employee.
    async fn account_by_employee(&self, employee_id: EmployeeId) -> StoreResult<Option<Account>>;

    /// Loads every account.
    async fn accounts(&self) -> StoreResult<Vec<Account>>;

    /// Loads a ledger transaction.
    async fn transaction(&self, id: TransactionId) -> StoreResult<Option<LedgerTransaction>>;

    /// Sums amounts per transaction type for one account and status.
    async fn totals_by_type(
        &self,
        account_id: AccountId,
        status: TransactionStatus,
    ) -> StoreResult<Vec<TypeTotal>>;

    /// Reads accounts, their posted totals per type and the escrow summary
    /// from one snapshot, without taking row locks. `account_id` narrows the
    /// accounts and totals to one account; the escrow summary is global.
    async fn reconciliation_snapshot(
        &self,
        account_id: Option<AccountId>,
    ) -> StoreResult<ReconciliationSnapshot>;

    /// One page of an account's transactions, newest first (ties broken by
    /// id descending), plus the total number of matching rows.
    async fn history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<LedgerTransaction>, u64)>;

    /// Loads a pending transfer.
    async fn pending_transfer(&self, id: PendingTransferId) -> StoreResult<Option<PendingTransfer>>;

    /// Pending transfers addressed to a normalised email, oldest first.
    async fn pending_transfers_for(&self, email: &str) -> StoreResult<Vec<PendingTransfer>>;

    /// Transfers created by a sender, newest first.
    async fn transfers_by_sender(
        &self,
        sender_employee_id: EmployeeId,
        status: Option<PendingTransferStatus>,
    ) -> StoreResult<Vec<PendingTransfer>>;

    /// Count and sum of transfers still in escrow.
    async fn escrow_summary(&self) -> StoreResult<EscrowSummary>;
}

/// One serializable transaction boundary.
#[async_trait]
pub trait UnitOfWork: Send {
    // ========== Accounts ==========

    /// Locks the employee's account, creating a zero-balance one if absent.
    async fn find_or_create_account(
        &mut self,
        employee_id: EmployeeId,
        at: DateTime<Utc>,
    ) -> StoreResult<Account>;

    /// Locks an account.
    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Adds a signed delta to a locked account's balance.
    async fn increment_balance(
        &mut self,
        id: AccountId,
        delta: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<Account>;

    /// Overwrites the allotment display mirror.
    async fn set_allotment_balance(
        &mut self,
        id: AccountId,
        value: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    // ========== Ledger transactions ==========

    /// Locks a ledger transaction.
    async fn lock_transaction(&mut self, id: TransactionId)
    -> StoreResult<Option<LedgerTransaction>>;

    /// Inserts a new row. A second row for the same wellness submission
    /// fails with [`StoreError::UniqueViolation`].
    async fn insert_transaction(&mut self, tx: &LedgerTransaction) -> StoreResult<()>;

    /// Sets `status = posted` and `posted_at`.
    async fn mark_posted(&mut self, id: TransactionId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Sets `status = rejected`, the reason and `rejected_at`.
    async fn mark_rejected(
        &mut self,
        id: TransactionId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    // ========== Allotments ==========

    /// Locks the allotment row for one manager period.
    async fn lock_allotment(
        &mut self,
        manager_id: EmployeeId,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> StoreResult<Option<ManagerAllotment>>;

    /// The manager's most recent row of a period type.
    async fn latest_allotment(
        &mut self,
        manager_id: EmployeeId,
        period_type: PeriodType,
    ) -> StoreResult<Option<ManagerAllotment>>;

    /// Inserts a new period row.
    async fn insert_allotment(&mut self, allotment: &ManagerAllotment) -> StoreResult<()>;

    /// Overwrites a locked row's budget.
    async fn update_allotment_amount(
        &mut self,
        id: AllotmentId,
        amount: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Sum of posted `manager_award` amounts sourced from the manager and
    /// created inside `[from, to)`.
    async fn awarded_total(
        &mut self,
        manager_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Coins>;

    // ========== Pending transfers ==========

    /// Locks a pending transfer.
    async fn lock_transfer(&mut self, id: PendingTransferId)
    -> StoreResult<Option<PendingTransfer>>;

    /// Locks the transfer created by an import job for an email.
    async fn transfer_by_import_key(
        &mut self,
        import_job_id: ImportJobId,
        recipient_email: &str,
    ) -> StoreResult<Option<PendingTransfer>>;

    /// Inserts a new transfer.
    async fn insert_transfer(&mut self, transfer: &PendingTransfer) -> StoreResult<()>;

    /// Persists a locked transfer's status and resolution fields.
    async fn update_transfer(&mut self, transfer: &PendingTransfer) -> StoreResult<()>;

    // ========== Boundary ==========

    /// Commits every write of this unit atomically.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
