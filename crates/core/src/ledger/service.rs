//! Ledger service: the transaction state machine.
//!
//! Every mutation runs inside one unit of work. The `*_in` associated
//! functions do the work against a caller-supplied unit so that other
//! services (allotments, transfers) can compose ledger steps into their own
//! atomic units; the methods on [`LedgerService`] open, commit and retry a
//! unit of their own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use kudos_shared::config::LedgerConfig;
use kudos_shared::types::{AccountId, Coins, EmployeeId, PageRequest, PageResponse, TransactionId};

use super::classification::net_of;
use super::error::LedgerError;
use super::posting::PostingRules;
use super::types::{
    Account, BalanceSummary, HistoryFilter, LedgerTransaction, NewTransaction, TransactionStatus,
};
use crate::clock::Clock;
use crate::retry::with_retries;
use crate::store::{LedgerStore, StoreError, UnitOfWork};

/// Ledger operations over an injected store.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl LedgerService {
    /// Creates a new ledger service.
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    // ========== Unit-of-work steps ==========

    /// Inserts a pending transaction inside `uow`. No balance effect.
    pub async fn create_pending_in(
        uow: &mut dyn UnitOfWork,
        input: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction, LedgerError> {
        PostingRules::validate_new(&input)?;
        if uow.lock_account(input.account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(input.account_id));
        }

        let tx = input.into_pending(now);
        if let Err(err) = uow.insert_transaction(&tx).await {
            return Err(match (err, tx.wellness_submission_id) {
                (StoreError::UniqueViolation(_), Some(submission)) => {
                    LedgerError::DuplicateWellnessReward(submission)
                }
                (err, _) => err.into(),
            });
        }

        debug!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            transaction_type = %tx.transaction_type,
            amount = %tx.amount,
            "created pending transaction"
        );
        Ok(tx)
    }

    /// Posts a pending transaction inside `uow`.
    ///
    /// Locks the transaction and its account, refuses overdrafts, then
    /// applies the balance delta and marks the row posted. Both writes land
    /// in the same unit, so they commit or roll back together.
    pub async fn post_in(
        uow: &mut dyn UnitOfWork,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut tx = uow
            .lock_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        PostingRules::ensure_pending(&tx)?;

        let account = uow
            .lock_account(tx.account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(tx.account_id))?;

        let plan = match PostingRules::plan(&tx, &account) {
            Ok(plan) => plan,
            Err(err) => {
                if let LedgerError::InsufficientFunds {
                    requested,
                    available,
                    ..
                } = &err
                {
                    warn!(
                        transaction_id = %tx.id,
                        account_id = %account.id,
                        requested = %requested,
                        available = %available,
                        "insufficient funds, transaction left pending"
                    );
                }
                return Err(err);
            }
        };

        uow.increment_balance(plan.account_id, plan.delta, now).await?;
        uow.mark_posted(plan.transaction_id, now).await?;

        tx.status = TransactionStatus::Posted;
        tx.posted_at = Some(now);

        info!(
            transaction_id = %tx.id,
            account_id = %plan.account_id,
            transaction_type = %tx.transaction_type,
            delta = %plan.delta,
            balance = %plan.new_balance,
            "transaction posted"
        );
        Ok(tx)
    }

    /// Rejects a pending transaction inside `uow`. Never touches a balance.
    pub async fn reject_in(
        uow: &mut dyn UnitOfWork,
        transaction_id: TransactionId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut tx = uow
            .lock_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        PostingRules::ensure_pending(&tx)?;

        uow.mark_rejected(transaction_id, reason, now).await?;

        tx.status = TransactionStatus::Rejected;
        tx.rejection_reason = reason.map(str::to_string);
        tx.rejected_at = Some(now);

        info!(transaction_id = %tx.id, account_id = %tx.account_id, reason = ?reason, "transaction rejected");
        Ok(tx)
    }

    /// Creates and posts in one step inside `uow`.
    pub async fn create_and_post_in(
        uow: &mut dyn UnitOfWork,
        input: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let tx = Self::create_pending_in(uow, input, now).await?;
        Self::post_in(uow, tx.id, now).await
    }

    // ========== Self-contained operations ==========

    /// Returns the employee's account, creating an empty one on first use.
    pub async fn find_or_create_account(&self, employee_id: EmployeeId) -> Result<Account, LedgerError> {
        if let Some(account) = self.store.account_by_employee(employee_id).await? {
            return Ok(account);
        }
        with_retries(self.config.max_serialization_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let account = uow.find_or_create_account(employee_id, self.clock.now()).await?;
            uow.commit().await?;
            Ok::<_, LedgerError>(account)
        })
        .await
    }

    /// Records a pending transaction.
    pub async fn create_pending(&self, input: NewTransaction) -> Result<LedgerTransaction, LedgerError> {
        PostingRules::validate_new(&input)?;
        with_retries(self.config.max_serialization_retries, move || {
            let input = input.clone();
            async move {
                let mut uow = self.store.begin().await?;
                let tx = Self::create_pending_in(uow.as_mut(), input, self.clock.now()).await?;
                uow.commit().await?;
                Ok::<_, LedgerError>(tx)
            }
        })
        .await
    }

    /// Posts a pending transaction in its own serializable unit.
    pub async fn post(&self, transaction_id: TransactionId) -> Result<LedgerTransaction, LedgerError> {
        with_retries(self.config.max_serialization_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let tx = Self::post_in(uow.as_mut(), transaction_id, self.clock.now()).await?;
            uow.commit().await?;
            Ok::<_, LedgerError>(tx)
        })
        .await
    }

    /// Rejects a pending transaction. Rejecting a terminal one is an error.
    pub async fn reject(
        &self,
        transaction_id: TransactionId,
        reason: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        with_retries(self.config.max_serialization_retries, move || {
            let reason = reason.clone();
            async move {
                let mut uow = self.store.begin().await?;
                let tx = Self::reject_in(uow.as_mut(), transaction_id, reason.as_deref(), self.clock.now())
                    .await?;
                uow.commit().await?;
                Ok::<_, LedgerError>(tx)
            }
        })
        .await
    }

    /// Creates and immediately posts a transaction as one unit.
    ///
    /// If posting fails nothing is persisted, not even the pending row.
    pub async fn create_and_post(&self, input: NewTransaction) -> Result<LedgerTransaction, LedgerError> {
        PostingRules::validate_new(&input)?;
        with_retries(self.config.max_serialization_retries, move || {
            let input = input.clone();
            async move {
                let mut uow = self.store.begin().await?;
                let tx = Self::create_and_post_in(uow.as_mut(), input, self.clock.now()).await?;
                uow.commit().await?;
                Ok::<_, LedgerError>(tx)
            }
        })
        .await
    }

    /// Administrative correction. Positive amounts credit, negative debit.
    pub async fn adjust(
        &self,
        account_id: AccountId,
        signed_amount: Coins,
        reason: &str,
    ) -> Result<LedgerTransaction, LedgerError> {
        let (transaction_type, amount) = PostingRules::adjustment_for(signed_amount)?;
        let input = NewTransaction::new(account_id, transaction_type, amount).with_description(reason);
        self.create_and_post(input).await
    }

    /// Current balance, optionally including the net of pending entries.
    pub async fn get_balance(
        &self,
        account_id: AccountId,
        include_pending: bool,
    ) -> Result<BalanceSummary, LedgerError> {
        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let pending = if include_pending {
            let totals = self
                .store
                .totals_by_type(account_id, TransactionStatus::Pending)
                .await?;
            net_of(&totals)
        } else {
            Coins::ZERO
        };

        debug!(account_id = %account_id, posted = %account.balance, pending = %pending, "balance read");
        Ok(BalanceSummary {
            account_id,
            posted: account.balance,
            pending,
            total: account.balance + pending,
        })
    }

    /// Paginated history, newest first.
    pub async fn get_history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerTransaction>, LedgerError> {
        if self.store.account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        let page = page.clamped(self.config.max_page_size);
        let (rows, total) = self.store.history(account_id, filter, page).await?;
        debug!(account_id = %account_id, total, page = page.page, "history read");
        Ok(PageResponse::new(rows, page, total))
    }
}
