//! Read side of the Postgres store.
//!
//! Single reads run on the pool. The reconciliation snapshot runs in one
//! repeatable-read, read-only transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use sea_orm::{
    AccessMode, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IsolationLevel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use kudos_core::ledger::{
    Account, AccountTypeTotal, HistoryFilter, LedgerTransaction, TransactionStatus, TypeTotal,
};
use kudos_core::store::{LedgerStore, ReconciliationSnapshot, StoreResult, UnitOfWork};
use kudos_core::transfer::{EscrowSummary, PendingTransfer, PendingTransferStatus};
use kudos_shared::types::{AccountId, EmployeeId, PageRequest, PendingTransferId, TransactionId};

use super::error::store_error;
use super::mapping;
use super::unit_of_work::PgUnitOfWork;
use crate::entities::{accounts, ledger_transactions, pending_transfers};

/// Store backed by a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
}

impl PgLedgerStore {
    /// Creates a new store over a connection pool.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// The enum column selected as plain text, so aggregates decode without
/// knowing the Postgres type.
fn type_label() -> SimpleExpr {
    Expr::col(ledger_transactions::Column::TransactionType).cast_as(Alias::new("text"))
}

fn amount_sum() -> SimpleExpr {
    Expr::col(ledger_transactions::Column::Amount).sum()
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let txn = self
            .db
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await
            .map_err(store_error)?;
        Ok(Box::new(PgUnitOfWork::new(txn)))
    }

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(mapping::account)
            .transpose()
    }

    async fn account_by_employee(&self, employee_id: EmployeeId) -> StoreResult<Option<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::EmployeeId.eq(employee_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(mapping::account)
            .transpose()
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        load_accounts(&self.db, None).await
    }

    async fn transaction(&self, id: TransactionId) -> StoreResult<Option<LedgerTransaction>> {
        ledger_transactions::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(mapping::transaction)
            .transpose()
    }

    async fn totals_by_type(
        &self,
        account_id: AccountId,
        status: TransactionStatus,
    ) -> StoreResult<Vec<TypeTotal>> {
        let rows: Vec<(String, Decimal)> = ledger_transactions::Entity::find()
            .select_only()
            .column_as(type_label(), "label")
            .column_as(amount_sum(), "total")
            .filter(ledger_transactions::Column::AccountId.eq(account_id.into_inner()))
            .filter(ledger_transactions::Column::Status.eq(mapping::db_transaction_status(status)?))
            .group_by(ledger_transactions::Column::TransactionType)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .map(|(label, total)| {
                Ok(TypeTotal {
                    transaction_type: mapping::transaction_type_label(&label)?,
                    total: mapping::coins(total)?,
                })
            })
            .collect()
    }

    async fn reconciliation_snapshot(
        &self,
        account_id: Option<AccountId>,
    ) -> StoreResult<ReconciliationSnapshot> {
        // One read-only snapshot; a post committing mid-run is either fully
        // visible or not at all. No row locks are taken.
        let txn = self
            .db
            .begin_with_config(Some(IsolationLevel::RepeatableRead), Some(AccessMode::ReadOnly))
            .await
            .map_err(store_error)?;

        let accounts = load_accounts(&txn, account_id).await?;
        let posted_totals = load_posted_totals(&txn, account_id).await?;
        let escrow = load_escrow(&txn).await?;
        txn.commit().await.map_err(store_error)?;

        debug!(
            accounts = accounts.len(),
            groups = posted_totals.len(),
            "Loaded reconciliation snapshot"
        );
        Ok(ReconciliationSnapshot {
            accounts,
            posted_totals,
            escrow,
        })
    }

    async fn history(
        &self,
        account_id: AccountId,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<LedgerTransaction>, u64)> {
        let mut query = ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::AccountId.eq(account_id.into_inner()));

        if let Some(status) = filter.status {
            query = query
                .filter(ledger_transactions::Column::Status.eq(mapping::db_transaction_status(status)?));
        }
        if !filter.transaction_types.is_empty() {
            let types = filter
                .transaction_types
                .iter()
                .map(|t| mapping::db_transaction_type(*t))
                .collect::<StoreResult<Vec<_>>>()?;
            query = query.filter(ledger_transactions::Column::TransactionType.is_in(types));
        }
        if let Some(from) = filter.created_from {
            query = query.filter(ledger_transactions::Column::CreatedAt.gte(mapping::fixed(from)));
        }
        if let Some(to) = filter.created_to {
            query = query.filter(ledger_transactions::Column::CreatedAt.lt(mapping::fixed(to)));
        }

        let total = query.clone().count(&self.db).await.map_err(store_error)?;

        let rows = query
            .order_by_desc(ledger_transactions::Column::CreatedAt)
            .order_by_desc(ledger_transactions::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(store_error)?;

        let data = rows
            .into_iter()
            .map(mapping::transaction)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((data, total))
    }

    async fn pending_transfer(&self, id: PendingTransferId) -> StoreResult<Option<PendingTransfer>> {
        pending_transfers::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(mapping::transfer)
            .transpose()
    }

    async fn pending_transfers_for(&self, email: &str) -> StoreResult<Vec<PendingTransfer>> {
        pending_transfers::Entity::find()
            .filter(pending_transfers::Column::RecipientEmail.eq(email))
            .filter(
                pending_transfers::Column::Status
                    .eq(mapping::db_transfer_status(PendingTransferStatus::Pending)?),
            )
            .order_by_asc(pending_transfers::Column::CreatedAt)
            .order_by_asc(pending_transfers::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(mapping::transfer)
            .collect()
    }

    async fn transfers_by_sender(
        &self,
        sender_employee_id: EmployeeId,
        status: Option<PendingTransferStatus>,
    ) -> StoreResult<Vec<PendingTransfer>> {
        let mut query = pending_transfers::Entity::find()
            .filter(pending_transfers::Column::SenderEmployeeId.eq(sender_employee_id.into_inner()));
        if let Some(status) = status {
            query = query.filter(pending_transfers::Column::Status.eq(mapping::db_transfer_status(status)?));
        }

        query
            .order_by_desc(pending_transfers::Column::CreatedAt)
            .order_by_desc(pending_transfers::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(mapping::transfer)
            .collect()
    }

    async fn escrow_summary(&self) -> StoreResult<EscrowSummary> {
        load_escrow(&self.db).await
    }
}

async fn load_accounts<C: ConnectionTrait>(
    conn: &C,
    account_id: Option<AccountId>,
) -> StoreResult<Vec<Account>> {
    let mut query = accounts::Entity::find();
    if let Some(id) = account_id {
        query = query.filter(accounts::Column::Id.eq(id.into_inner()));
    }
    query
        .order_by_asc(accounts::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(store_error)?
        .into_iter()
        .map(mapping::account)
        .collect()
}

async fn load_posted_totals<C: ConnectionTrait>(
    conn: &C,
    account_id: Option<AccountId>,
) -> StoreResult<Vec<AccountTypeTotal>> {
    let mut query = ledger_transactions::Entity::find()
        .select_only()
        .column(ledger_transactions::Column::AccountId)
        .column_as(type_label(), "label")
        .column_as(amount_sum(), "total")
        .filter(
            ledger_transactions::Column::Status
                .eq(mapping::db_transaction_status(TransactionStatus::Posted)?),
        );
    if let Some(id) = account_id {
        query = query.filter(ledger_transactions::Column::AccountId.eq(id.into_inner()));
    }

    let rows: Vec<(Uuid, String, Decimal)> = query
        .group_by(ledger_transactions::Column::AccountId)
        .group_by(ledger_transactions::Column::TransactionType)
        .into_tuple()
        .all(conn)
        .await
        .map_err(store_error)?;

    rows.into_iter()
        .map(|(account_id, label, total)| {
            Ok(AccountTypeTotal {
                account_id: account_id.into(),
                transaction_type: mapping::transaction_type_label(&label)?,
                total: mapping::coins(total)?,
            })
        })
        .collect()
}

async fn load_escrow<C: ConnectionTrait>(conn: &C) -> StoreResult<EscrowSummary> {
    let row: Option<(i64, Option<Decimal>)> = pending_transfers::Entity::find()
        .select_only()
        .column_as(Expr::col(pending_transfers::Column::Id).count(), "count")
        .column_as(Expr::col(pending_transfers::Column::Amount).sum(), "amount")
        .filter(
            pending_transfers::Column::Status
                .eq(mapping::db_transfer_status(PendingTransferStatus::Pending)?),
        )
        .into_tuple()
        .one(conn)
        .await
        .map_err(store_error)?;

    let (count, amount) = row.unwrap_or((0, None));
    Ok(EscrowSummary {
        count: u64::try_from(count).unwrap_or_default(),
        amount: mapping::coins(amount.unwrap_or_default())?,
    })
}
