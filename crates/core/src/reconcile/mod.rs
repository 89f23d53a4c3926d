//! Read-only balance drift detection.
//!
//! Recomputes every account balance from posted ledger entries and reports
//! the accounts whose stored balance disagrees. Every run reads one
//! consistent snapshot. Nothing is locked and nothing is repaired.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use kudos_shared::AppError;
use kudos_shared::types::{AccountId, Coins, EmployeeId};

use crate::clock::Clock;
use crate::ledger::{Account, AccountTypeTotal, TypeTotal, net_of};
use crate::store::{LedgerStore, StoreError};

/// Reconciliation failure.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The requested account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::Store(err) => err.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::AccountNotFound(_) => 404,
            Self::Store(StoreError::SerializationFailure | StoreError::UniqueViolation(_)) => 409,
            Self::Store(StoreError::Backend(_)) => 500,
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::AccountNotFound(_) => Self::NotFound(err.to_string()),
            ReconcileError::Store(store) => store.into(),
        }
    }
}

/// One account whose stored balance disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// The account.
    pub account_id: AccountId,
    /// Its owner.
    pub employee_id: EmployeeId,
    /// `accounts.balance`.
    pub stored_balance: Coins,
    /// Posted credits minus posted debits.
    pub computed_balance: Coins,
    /// `stored - computed`.
    pub difference: Coins,
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// When the run started.
    pub generated_at: DateTime<Utc>,
    /// Number of accounts compared.
    pub accounts_checked: usize,
    /// Accounts off by at least one minor unit.
    pub discrepancies: Vec<Discrepancy>,
    /// Coins debited from senders and held for unregistered recipients.
    pub escrow_outstanding: Coins,
    /// Number of transfers still pending.
    pub pending_transfer_count: u64,
}

impl ReconciliationReport {
    /// Returns true when no discrepancy was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compares one account's stored balance with its computed one.
fn check(account: &Account, totals: &[TypeTotal]) -> Option<Discrepancy> {
    let computed = net_of(totals);
    let difference = account.balance - computed;
    (difference.abs() >= Coins::MINOR_UNIT).then(|| Discrepancy {
        account_id: account.id,
        employee_id: account.employee_id,
        stored_balance: account.balance,
        computed_balance: computed,
        difference,
    })
}

/// On-demand reconciliation.
#[derive(Clone)]
pub struct ReconciliationService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationService {
    /// Creates a new reconciliation service.
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Checks every account.
    ///
    /// Accounts, posted totals and escrow come from one store snapshot, so
    /// entries posted while the run is in flight are either fully visible
    /// or not at all.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ReconcileError> {
        let generated_at = self.clock.now();
        let snapshot = self.store.reconciliation_snapshot(None).await?;
        let totals = group_totals(snapshot.posted_totals);

        let discrepancies: Vec<Discrepancy> = snapshot
            .accounts
            .iter()
            .filter_map(|account| {
                check(account, totals.get(&account.id).map_or(&[], Vec::as_slice))
            })
            .collect();

        for d in &discrepancies {
            warn!(
                account_id = %d.account_id,
                stored = %d.stored_balance,
                computed = %d.computed_balance,
                difference = %d.difference,
                "balance discrepancy"
            );
        }

        let escrow = snapshot.escrow;
        info!(
            accounts = snapshot.accounts.len(),
            discrepancies = discrepancies.len(),
            escrow = %escrow.amount,
            "reconciliation finished"
        );

        Ok(ReconciliationReport {
            generated_at,
            accounts_checked: snapshot.accounts.len(),
            discrepancies,
            escrow_outstanding: escrow.amount,
            pending_transfer_count: escrow.count,
        })
    }

    /// Checks a single account. `None` means it reconciles.
    pub async fn reconcile_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Discrepancy>, ReconcileError> {
        let snapshot = self.store.reconciliation_snapshot(Some(account_id)).await?;
        let account = snapshot
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or(ReconcileError::AccountNotFound(account_id))?;
        let totals = group_totals(snapshot.posted_totals);
        debug!(account_id = %account_id, "account reconciled");
        Ok(check(account, totals.get(&account_id).map_or(&[], Vec::as_slice)))
    }
}

fn group_totals(rows: Vec<AccountTypeTotal>) -> HashMap<AccountId, Vec<TypeTotal>> {
    let mut totals: HashMap<AccountId, Vec<TypeTotal>> = HashMap::new();
    for row in rows {
        totals.entry(row.account_id).or_default().push(TypeTotal {
            transaction_type: row.transaction_type,
            total: row.total,
        });
    }
    totals
}
