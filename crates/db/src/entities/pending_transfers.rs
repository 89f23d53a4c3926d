//! `SeaORM` Entity for pending_transfers table.

use super::sea_orm_active_enums::PendingTransferStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sender_employee_id: Uuid,
    pub sender_account_id: Uuid,
    pub recipient_email: String,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,
    pub sender_transaction_id: Uuid,
    pub status: PendingTransferStatus,
    pub import_job_id: Option<Uuid>,
    pub recipient_account_id: Option<Uuid>,
    pub recipient_transaction_id: Option<Uuid>,
    pub refund_transaction_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub resolved_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::SenderAccountId",
        to = "super::accounts::Column::Id"
    )]
    SenderAccount,
    #[sea_orm(
        belongs_to = "super::ledger_transactions::Entity",
        from = "Column::SenderTransactionId",
        to = "super::ledger_transactions::Column::Id"
    )]
    SenderTransaction,
}

impl ActiveModelBehavior for ActiveModel {}
