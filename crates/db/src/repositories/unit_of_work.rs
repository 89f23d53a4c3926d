//! Write side of the Postgres store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::debug;

use kudos_core::allotment::{ManagerAllotment, PeriodType};
use kudos_core::ledger::{Account, LedgerTransaction, TransactionStatus, TransactionType};
use kudos_core::store::{StoreError, StoreResult, UnitOfWork};
use kudos_core::transfer::PendingTransfer;
use kudos_shared::types::{
    AccountId, AllotmentId, Coins, EmployeeId, ImportJobId, PendingTransferId, TransactionId,
};

use super::error::store_error;
use super::mapping;
use crate::entities::{accounts, ledger_transactions, manager_allotments, pending_transfers};

/// One serializable Postgres transaction.
///
/// Every `lock_*` read is issued `FOR UPDATE`. Dropping the unit without
/// committing rolls the transaction back.
pub struct PgUnitOfWork {
    txn: DatabaseTransaction,
}

impl PgUnitOfWork {
    pub(crate) const fn new(txn: DatabaseTransaction) -> Self {
        Self { txn }
    }

    async fn locked_account_row(&self, id: AccountId) -> StoreResult<Option<accounts::Model>> {
        accounts::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    // ========== Accounts ==========

    async fn find_or_create_account(
        &mut self,
        employee_id: EmployeeId,
        at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let fresh = Account::open(employee_id, at);
        let row = accounts::ActiveModel {
            id: Set(fresh.id.into_inner()),
            employee_id: Set(employee_id.into_inner()),
            balance: Set(Decimal::ZERO),
            allotment_balance: Set(Decimal::ZERO),
            created_at: Set(mapping::fixed(at)),
            updated_at: Set(mapping::fixed(at)),
        };

        let inserted = accounts::Entity::insert(row)
            .on_conflict(
                OnConflict::column(accounts::Column::EmployeeId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_error)?;
        if inserted > 0 {
            debug!(employee_id = %employee_id, "Opened account");
        }

        let model = accounts::Entity::find()
            .filter(accounts::Column::EmployeeId.eq(employee_id.into_inner()))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                StoreError::Backend(format!("account for employee {employee_id} vanished"))
            })?;
        mapping::account(model)
    }

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.locked_account_row(id)
            .await?
            .map(mapping::account)
            .transpose()
    }

    async fn increment_balance(
        &mut self,
        id: AccountId,
        delta: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(Decimal::from(delta)),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(mapping::fixed(at)))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(store_error)?;
        if result.rows_affected == 0 {
            return Err(StoreError::Backend(format!("account {id} does not exist")));
        }

        self.locked_account_row(id)
            .await?
            .map(mapping::account)
            .transpose()?
            .ok_or_else(|| StoreError::Backend(format!("account {id} does not exist")))
    }

    async fn set_allotment_balance(
        &mut self,
        id: AccountId,
        value: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        accounts::ActiveModel {
            id: Unchanged(id.into_inner()),
            allotment_balance: Set(value.into()),
            updated_at: Set(mapping::fixed(at)),
            ..Default::default()
        }
        .update(&self.txn)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    // ========== Ledger transactions ==========

    async fn lock_transaction(
        &mut self,
        id: TransactionId,
    ) -> StoreResult<Option<LedgerTransaction>> {
        ledger_transactions::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_error)?
            .map(mapping::transaction)
            .transpose()
    }

    async fn insert_transaction(&mut self, tx: &LedgerTransaction) -> StoreResult<()> {
        ledger_transactions::Entity::insert(mapping::transaction_row(tx)?)
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn mark_posted(&mut self, id: TransactionId, at: DateTime<Utc>) -> StoreResult<()> {
        ledger_transactions::ActiveModel {
            id: Unchanged(id.into_inner()),
            status: Set(mapping::db_transaction_status(TransactionStatus::Posted)?),
            posted_at: Set(Some(mapping::fixed(at))),
            ..Default::default()
        }
        .update(&self.txn)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn mark_rejected(
        &mut self,
        id: TransactionId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        ledger_transactions::ActiveModel {
            id: Unchanged(id.into_inner()),
            status: Set(mapping::db_transaction_status(TransactionStatus::Rejected)?),
            rejection_reason: Set(reason.map(str::to_string)),
            rejected_at: Set(Some(mapping::fixed(at))),
            ..Default::default()
        }
        .update(&self.txn)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    // ========== Allotments ==========

    async fn lock_allotment(
        &mut self,
        manager_id: EmployeeId,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> StoreResult<Option<ManagerAllotment>> {
        manager_allotments::Entity::find()
            .filter(manager_allotments::Column::ManagerId.eq(manager_id.into_inner()))
            .filter(manager_allotments::Column::PeriodType.eq(mapping::db_period_type(period_type)?))
            .filter(manager_allotments::Column::PeriodStart.eq(mapping::fixed(period_start)))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_error)?
            .map(mapping::allotment)
            .transpose()
    }

    async fn latest_allotment(
        &mut self,
        manager_id: EmployeeId,
        period_type: PeriodType,
    ) -> StoreResult<Option<ManagerAllotment>> {
        manager_allotments::Entity::find()
            .filter(manager_allotments::Column::ManagerId.eq(manager_id.into_inner()))
            .filter(manager_allotments::Column::PeriodType.eq(mapping::db_period_type(period_type)?))
            .order_by_desc(manager_allotments::Column::PeriodStart)
            .one(&self.txn)
            .await
            .map_err(store_error)?
            .map(mapping::allotment)
            .transpose()
    }

    async fn insert_allotment(&mut self, allotment: &ManagerAllotment) -> StoreResult<()> {
        manager_allotments::Entity::insert(mapping::allotment_row(allotment)?)
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn update_allotment_amount(
        &mut self,
        id: AllotmentId,
        amount: Coins,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        manager_allotments::ActiveModel {
            id: Unchanged(id.into_inner()),
            amount: Set(amount.into()),
            updated_at: Set(mapping::fixed(at)),
            ..Default::default()
        }
        .update(&self.txn)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn awarded_total(
        &mut self,
        manager_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Coins> {
        let total: Option<Option<Decimal>> = ledger_transactions::Entity::find()
            .select_only()
            .column_as(Expr::col(ledger_transactions::Column::Amount).sum(), "total")
            .filter(
                ledger_transactions::Column::TransactionType
                    .eq(mapping::db_transaction_type(TransactionType::ManagerAward)?),
            )
            .filter(
                ledger_transactions::Column::Status
                    .eq(mapping::db_transaction_status(TransactionStatus::Posted)?),
            )
            .filter(ledger_transactions::Column::SourceEmployeeId.eq(manager_id.into_inner()))
            .filter(ledger_transactions::Column::CreatedAt.gte(mapping::fixed(from)))
            .filter(ledger_transactions::Column::CreatedAt.lt(mapping::fixed(to)))
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(store_error)?;

        mapping::coins(total.flatten().unwrap_or_default())
    }

    // ========== Pending transfers ==========

    async fn lock_transfer(
        &mut self,
        id: PendingTransferId,
    ) -> StoreResult<Option<PendingTransfer>> {
        pending_transfers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_error)?
            .map(mapping::transfer)
            .transpose()
    }

    async fn transfer_by_import_key(
        &mut self,
        import_job_id: ImportJobId,
        recipient_email: &str,
    ) -> StoreResult<Option<PendingTransfer>> {
        pending_transfers::Entity::find()
            .filter(pending_transfers::Column::ImportJobId.eq(import_job_id.into_inner()))
            .filter(pending_transfers::Column::RecipientEmail.eq(recipient_email))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_error)?
            .map(mapping::transfer)
            .transpose()
    }

    async fn insert_transfer(&mut self, transfer: &PendingTransfer) -> StoreResult<()> {
        pending_transfers::Entity::insert(mapping::transfer_row(transfer)?)
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &PendingTransfer) -> StoreResult<()> {
        let mut row = mapping::transfer_row(transfer)?;
        row.id = Unchanged(transfer.id.into_inner());
        row.update(&self.txn).await.map_err(store_error)?;
        Ok(())
    }

    // ========== Boundary ==========

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self { txn } = *self;
        txn.commit().await.map_err(store_error)
    }
}
