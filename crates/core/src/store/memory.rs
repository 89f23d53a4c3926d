//! In-memory [`LedgerStore`] used by tests and local tooling.
//!
//! A unit of work holds the store's async mutex for its whole lifetime, so
//! units are fully serialized. Writes go to a working copy that replaces the
//! shared state on commit and is discarded on drop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use kudos_shared::types::{
    AccountId, AllotmentId, Coins, EmployeeId, ImportJobId, PageRequest, PendingTransferId,
    TransactionId,
};

use super::{LedgerStore, ReconciliationSnapshot, StoreError, StoreResult, UnitOfWork};
use crate::allotment::{ManagerAllotment, PeriodType};
use crate::ledger::{
    Account, AccountTypeTotal, HistoryFilter, LedgerTransaction, TransactionStatus,
    TransactionType, TypeTotal,
};
use crate::transfer::{EscrowSummary, PendingTransfer, PendingTransferStatus};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    transactions: BTreeMap<TransactionId, LedgerTransaction>,
    allotments: BTreeMap<AllotmentId, ManagerAllotment>,
    transfers: BTreeMap<PendingTransferId, PendingTransfer>,
}

impl MemoryState {
    fn account_mut(&mut self, id: AccountId) -> StoreResult<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("account {id} does not exist")))
    }

    fn transaction_mut(&mut self, id: TransactionId) -> StoreResult<&mut LedgerTransaction> {
        self.transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("transaction {id} does not exist")))
    }

    fn totals_by_type(&self, account_id: AccountId, status: TransactionStatus) -> Vec<TypeTotal> {
        let mut totals: BTreeMap<TransactionType, Coins> = BTreeMap::new();
        for tx in self
            .transactions
            .values()
            .filter(|tx| tx.account_id == account_id && tx.status == status)
        {
            *totals.entry(tx.transaction_type).or_default() += tx.amount;
        }
        totals
            .into_iter()
            .map(|(transaction_type, total)| TypeTotal {
                transaction_type,
                total,
            })
            .collect()
    }

    fn posted_totals(&self, account_id: Option<AccountId>) -> Vec<AccountTypeTotal> {
        let mut totals: BTreeMap<(AccountId, TransactionType), Coins> = BTreeMap::new();
        for tx in self.transactions.values().filter(|tx| {
            tx.status == TransactionStatus::Posted
                && account_id.is_none_or(|id| id == tx.account_id)
        }) {
            *totals
                .entry((tx.account_id, tx.transaction_type))
                .or_default() += tx.amount;
        }
        totals
            .into_iter()
            .map(|((account_id, transaction_type), total)| AccountTypeTotal {
                account_id,
                transaction_type,
                total,
            })
            .collect()
    }

    fn escrow_summary(&self) -> EscrowSummary {
        self.transfers
            .values()
            .filter(|t| t.status == PendingTransferStatus::Pending)
            .fold(EscrowSummary::default(), |acc, t| EscrowSummary {
                count: acc.count + 1,
                amount: acc.amount + t.amount,
            })
    }
}

/// Store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_commits: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with
    /// [`StoreError::SerializationFailure`], discarding their writes.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard,
            work,
            failing_commits: Arc::clone(&self.failing_commits),
        }))
    }

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn account_by_employee(&self, employee_id: EmployeeId) -> StoreResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.employee_id == employee_id)
            .cloned())
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self.state.lock().await.accounts.values().cloned().collect())
    }

    async fn transaction(&self, id: TransactionId) -> StoreResult<Option<LedgerTransaction>> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn totals_by_type(
        &self,
        account_id: AccountId,
        status: TransactionStatus,
    ) -> StoreResult<Vec<TypeTotal>> {
        Ok(self.state.lock().await.totals_by_type(account_id, status))
    }

    async fn reconciliation_snapshot(
        &self,
        account_id: Option<AccountId>,
    ) -> StoreResult<ReconciliationSnapshot> {
        let state = self.state.lock().await;
        Ok(ReconciliationSnapshot {
            accounts: state
                .accounts
                .values()
                .filter(|a| account_id.is_none_or(|id| id == a.id))
                .cloned()
                .collect(),
            posted_totals: state.posted_totals(account_id),
            escrow: state.escrow_summary(),
        })
    }

    async fn history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<LedgerTransaction>, u64)> {
        let state = self.state.lock().await;
        let mut rows: Vec<&LedgerTransaction> = state
            .transactions
            .values()
            .filter(|tx| tx.account_id == account_id && filter.matches(tx))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = u64::try_from(rows.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let data = rows.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((data, total))
    }

    async fn pending_transfer(&self, id: PendingTransferId) -> StoreResult<Option<PendingTransfer>> {
        Ok(self.state.lock().await.transfers.get(&id).cloned())
    }

    async fn pending_transfers_for(&self, email: &str) -> StoreResult<Vec<PendingTransfer>> {
        let state = self.state.lock().await;
        let mut rows: Vec<PendingTransfer> = state
            .transfers
            .values()
            .filter(|t| t.status == PendingTransferStatus::Pending && t.recipient_email == email)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn transfers_by_sender(
        &self,
        sender_employee_id: EmployeeId,
        status: Option<PendingTransferStatus>,
    ) -> StoreResult<Vec<PendingTransfer>> {
        let state = self.state.lock().await;
        let mut rows: Vec<PendingTransfer> = state
            .transfers
            .values()
            .filter(|t| {
                t.sender_employee_id == sender_employee_id && status.is_none_or(|s| s == t.status)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn escrow_summary(&self) -> StoreResult<EscrowSummary> {
        Ok(self.state.lock().await.escrow_summary())
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    failing_commits: Arc<AtomicU32>,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn find_or_create_account(
        &mut self,
        employee_id: EmployeeId,
        at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        if let Some(account) = self
            .work
            .accounts
            .values()
            .find(|a| a.employee_id == employee_id)
        {
            return Ok(account.clone());
        }
        let account = Account::open(employee_id, at);
        self.work.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.work.accounts.get(&id).cloned())
    }

    async fn increment_balance(
        &mut self,
        id: AccountId,
        delta: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let account = self.work.account_mut(id)?;
        account.balance += delta;
        account.updated_at = at;
        Ok(account.clone())
    }

    async fn set_allotment_balance(
        &mut self,
        id: AccountId,
        value: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let account = self.work.account_mut(id)?;
        account.allotment_balance = value;
        account.updated_at = at;
        Ok(())
    }

    async fn lock_transaction(
        &mut self,
        id: TransactionId,
    ) -> StoreResult<Option<LedgerTransaction>> {
        Ok(self.work.transactions.get(&id).cloned())
    }

    async fn insert_transaction(&mut self, tx: &LedgerTransaction) -> StoreResult<()> {
        if self.work.transactions.contains_key(&tx.id) {
            return Err(StoreError::UniqueViolation(
                "ledger_transactions_pkey".to_string(),
            ));
        }
        if let Some(submission) = tx.wellness_submission_id
            && self
                .work
                .transactions
                .values()
                .any(|t| t.wellness_submission_id == Some(submission))
        {
            return Err(StoreError::UniqueViolation(
                "ledger_transactions_wellness_submission_id_key".to_string(),
            ));
        }
        self.work.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn mark_posted(&mut self, id: TransactionId, at: DateTime<Utc>) -> StoreResult<()> {
        let tx = self.work.transaction_mut(id)?;
        tx.status = TransactionStatus::Posted;
        tx.posted_at = Some(at);
        Ok(())
    }

    async fn mark_rejected(
        &mut self,
        id: TransactionId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let tx = self.work.transaction_mut(id)?;
        tx.status = TransactionStatus::Rejected;
        tx.rejection_reason = reason.map(str::to_string);
        tx.rejected_at = Some(at);
        Ok(())
    }

    async fn lock_allotment(
        &mut self,
        manager_id: EmployeeId,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> StoreResult<Option<ManagerAllotment>> {
        Ok(self
            .work
            .allotments
            .values()
            .find(|a| {
                a.manager_id == manager_id
                    && a.period_type == period_type
                    && a.period_start == period_start
            })
            .cloned())
    }

    async fn latest_allotment(
        &mut self,
        manager_id: EmployeeId,
        period_type: PeriodType,
    ) -> StoreResult<Option<ManagerAllotment>> {
        Ok(self
            .work
            .allotments
            .values()
            .filter(|a| a.manager_id == manager_id && a.period_type == period_type)
            .max_by_key(|a| a.period_start)
            .cloned())
    }

    async fn insert_allotment(&mut self, allotment: &ManagerAllotment) -> StoreResult<()> {
        let duplicate = self.work.allotments.values().any(|a| {
            a.manager_id == allotment.manager_id
                && a.period_type == allotment.period_type
                && a.period_start == allotment.period_start
        });
        if duplicate {
            return Err(StoreError::UniqueViolation(
                "manager_allotments_manager_period_key".to_string(),
            ));
        }
        self.work.allotments.insert(allotment.id, allotment.clone());
        Ok(())
    }

    async fn update_allotment_amount(
        &mut self,
        id: AllotmentId,
        amount: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let allotment = self
            .work
            .allotments
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("allotment {id} does not exist")))?;
        allotment.amount = amount;
        allotment.updated_at = at;
        Ok(())
    }

    async fn awarded_total(
        &mut self,
        manager_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Coins> {
        Ok(self
            .work
            .transactions
            .values()
            .filter(|tx| {
                tx.transaction_type == TransactionType::ManagerAward
                    && tx.status == TransactionStatus::Posted
                    && tx.source_employee_id == Some(manager_id)
                    && from <= tx.created_at
                    && tx.created_at < to
            })
            .map(|tx| tx.amount)
            .sum())
    }

    async fn lock_transfer(
        &mut self,
        id: PendingTransferId,
    ) -> StoreResult<Option<PendingTransfer>> {
        Ok(self.work.transfers.get(&id).cloned())
    }

    async fn transfer_by_import_key(
        &mut self,
        import_job_id: ImportJobId,
        recipient_email: &str,
    ) -> StoreResult<Option<PendingTransfer>> {
        Ok(self
            .work
            .transfers
            .values()
            .find(|t| {
                t.import_job_id == Some(import_job_id) && t.recipient_email == recipient_email
            })
            .cloned())
    }

    async fn insert_transfer(&mut self, transfer: &PendingTransfer) -> StoreResult<()> {
        if let Some(job) = transfer.import_job_id
            && self.work.transfers.values().any(|t| {
                t.import_job_id == Some(job) && t.recipient_email == transfer.recipient_email
            })
        {
            return Err(StoreError::UniqueViolation(
                "pending_transfers_import_job_email_key".to_string(),
            ));
        }
        self.work.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &PendingTransfer) -> StoreResult<()> {
        let row = self
            .work
            .transfers
            .get_mut(&transfer.id)
            .ok_or_else(|| StoreError::Backend(format!("transfer {} does not exist", transfer.id)))?;
        *row = transfer.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            mut guard,
            work,
            failing_commits,
        } = *self;
        let injected = failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::SerializationFailure);
        }
        *guard = work;
        Ok(())
    }
}
