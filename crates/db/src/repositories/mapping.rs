//! Conversions between entity models and domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveEnum, Set};

use kudos_core::allotment::{ManagerAllotment, PeriodType};
use kudos_core::ledger::{Account, LedgerTransaction, TransactionStatus, TransactionType};
use kudos_core::store::{StoreError, StoreResult};
use kudos_core::transfer::{PendingTransfer, PendingTransferStatus};
use kudos_shared::types::Coins;

use crate::entities::sea_orm_active_enums as db;
use crate::entities::{accounts, ledger_transactions, manager_allotments, pending_transfers};

// ====== Scalars ======

pub(crate) fn coins(value: Decimal) -> StoreResult<Coins> {
    Coins::new(value).map_err(|e| StoreError::Backend(e.to_string()))
}

pub(crate) fn utc(at: DateTimeWithTimeZone) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub(crate) fn fixed(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.into()
}

fn unknown(kind: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unknown {kind} in database: {value}"))
}

// ====== Enums ======

fn enum_value<E: ActiveEnum<Value = String>>(label: &'static str) -> StoreResult<E> {
    E::try_from_value(&label.to_string()).map_err(|e| StoreError::Backend(e.to_string()))
}

pub(crate) fn db_transaction_type(t: TransactionType) -> StoreResult<db::TransactionType> {
    enum_value(t.as_str())
}

pub(crate) fn transaction_type(t: &db::TransactionType) -> StoreResult<TransactionType> {
    let value = t.to_value();
    TransactionType::parse(&value).ok_or_else(|| unknown("transaction type", &value))
}

/// Parses a transaction type selected as text.
pub(crate) fn transaction_type_label(value: &str) -> StoreResult<TransactionType> {
    TransactionType::parse(value).ok_or_else(|| unknown("transaction type", value))
}

pub(crate) fn db_transaction_status(s: TransactionStatus) -> StoreResult<db::TransactionStatus> {
    enum_value(s.as_str())
}

fn transaction_status(s: &db::TransactionStatus) -> StoreResult<TransactionStatus> {
    let value = s.to_value();
    TransactionStatus::parse(&value).ok_or_else(|| unknown("transaction status", &value))
}

pub(crate) fn db_period_type(p: PeriodType) -> StoreResult<db::AllotmentPeriodType> {
    enum_value(p.as_str())
}

fn period_type(p: &db::AllotmentPeriodType) -> StoreResult<PeriodType> {
    let value = p.to_value();
    PeriodType::parse(&value).ok_or_else(|| unknown("period type", &value))
}

pub(crate) fn db_transfer_status(
    s: PendingTransferStatus,
) -> StoreResult<db::PendingTransferStatus> {
    enum_value(s.as_str())
}

fn transfer_status(s: &db::PendingTransferStatus) -> StoreResult<PendingTransferStatus> {
    let value = s.to_value();
    PendingTransferStatus::parse(&value).ok_or_else(|| unknown("transfer status", &value))
}

// ====== Accounts ======

pub(crate) fn account(m: accounts::Model) -> StoreResult<Account> {
    Ok(Account {
        id: m.id.into(),
        employee_id: m.employee_id.into(),
        balance: coins(m.balance)?,
        allotment_balance: coins(m.allotment_balance)?,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
    })
}

// ====== Ledger transactions ======

pub(crate) fn transaction(m: ledger_transactions::Model) -> StoreResult<LedgerTransaction> {
    Ok(LedgerTransaction {
        id: m.id.into(),
        account_id: m.account_id.into(),
        transaction_type: transaction_type(&m.transaction_type)?,
        amount: coins(m.amount)?,
        status: transaction_status(&m.status)?,
        description: m.description,
        source_employee_id: m.source_employee_id.map(Into::into),
        target_employee_id: m.target_employee_id.map(Into::into),
        wellness_submission_id: m.wellness_submission_id.map(Into::into),
        rejection_reason: m.rejection_reason,
        created_at: utc(m.created_at),
        posted_at: m.posted_at.map(utc),
        rejected_at: m.rejected_at.map(utc),
    })
}

pub(crate) fn transaction_row(
    tx: &LedgerTransaction,
) -> StoreResult<ledger_transactions::ActiveModel> {
    Ok(ledger_transactions::ActiveModel {
        id: Set(tx.id.into_inner()),
        account_id: Set(tx.account_id.into_inner()),
        transaction_type: Set(db_transaction_type(tx.transaction_type)?),
        amount: Set(tx.amount.into()),
        status: Set(db_transaction_status(tx.status)?),
        description: Set(tx.description.clone()),
        source_employee_id: Set(tx.source_employee_id.map(|id| id.into_inner())),
        target_employee_id: Set(tx.target_employee_id.map(|id| id.into_inner())),
        wellness_submission_id: Set(tx.wellness_submission_id.map(|id| id.into_inner())),
        rejection_reason: Set(tx.rejection_reason.clone()),
        created_at: Set(fixed(tx.created_at)),
        posted_at: Set(tx.posted_at.map(fixed)),
        rejected_at: Set(tx.rejected_at.map(fixed)),
    })
}

// ====== Allotments ======

pub(crate) fn allotment(m: manager_allotments::Model) -> StoreResult<ManagerAllotment> {
    Ok(ManagerAllotment {
        id: m.id.into(),
        manager_id: m.manager_id.into(),
        period_type: period_type(&m.period_type)?,
        amount: coins(m.amount)?,
        period_start: utc(m.period_start),
        period_end: utc(m.period_end),
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
    })
}

pub(crate) fn allotment_row(a: &ManagerAllotment) -> StoreResult<manager_allotments::ActiveModel> {
    Ok(manager_allotments::ActiveModel {
        id: Set(a.id.into_inner()),
        manager_id: Set(a.manager_id.into_inner()),
        period_type: Set(db_period_type(a.period_type)?),
        amount: Set(a.amount.into()),
        period_start: Set(fixed(a.period_start)),
        period_end: Set(fixed(a.period_end)),
        created_at: Set(fixed(a.created_at)),
        updated_at: Set(fixed(a.updated_at)),
    })
}

// ====== Pending transfers ======

pub(crate) fn transfer(m: pending_transfers::Model) -> StoreResult<PendingTransfer> {
    Ok(PendingTransfer {
        id: m.id.into(),
        sender_employee_id: m.sender_employee_id.into(),
        sender_account_id: m.sender_account_id.into(),
        recipient_email: m.recipient_email,
        amount: coins(m.amount)?,
        message: m.message,
        sender_transaction_id: m.sender_transaction_id.into(),
        status: transfer_status(&m.status)?,
        import_job_id: m.import_job_id.map(Into::into),
        recipient_account_id: m.recipient_account_id.map(Into::into),
        recipient_transaction_id: m.recipient_transaction_id.map(Into::into),
        refund_transaction_id: m.refund_transaction_id.map(Into::into),
        created_at: utc(m.created_at),
        resolved_at: m.resolved_at.map(utc),
    })
}

pub(crate) fn transfer_row(t: &PendingTransfer) -> StoreResult<pending_transfers::ActiveModel> {
    Ok(pending_transfers::ActiveModel {
        id: Set(t.id.into_inner()),
        sender_employee_id: Set(t.sender_employee_id.into_inner()),
        sender_account_id: Set(t.sender_account_id.into_inner()),
        recipient_email: Set(t.recipient_email.clone()),
        amount: Set(t.amount.into()),
        message: Set(t.message.clone()),
        sender_transaction_id: Set(t.sender_transaction_id.into_inner()),
        status: Set(db_transfer_status(t.status)?),
        import_job_id: Set(t.import_job_id.map(|id| id.into_inner())),
        recipient_account_id: Set(t.recipient_account_id.map(|id| id.into_inner())),
        recipient_transaction_id: Set(t.recipient_transaction_id.map(|id| id.into_inner())),
        refund_transaction_id: Set(t.refund_transaction_id.map(|id| id.into_inner())),
        created_at: Set(fixed(t.created_at)),
        resolved_at: Set(t.resolved_at.map(fixed)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_transaction_type_has_a_database_label() {
        for t in TransactionType::ALL {
            let stored = db_transaction_type(t).unwrap();
            assert_eq!(transaction_type(&stored).unwrap(), t);
        }
    }

    #[test]
    fn test_statuses_and_periods_map_both_ways() {
        for s in [
            TransactionStatus::Pending,
            TransactionStatus::Posted,
            TransactionStatus::Rejected,
        ] {
            assert_eq!(transaction_status(&db_transaction_status(s).unwrap()).unwrap(), s);
        }
        for p in [PeriodType::Monthly, PeriodType::Quarterly] {
            assert_eq!(period_type(&db_period_type(p).unwrap()).unwrap(), p);
        }
        for s in [
            PendingTransferStatus::Pending,
            PendingTransferStatus::Claimed,
            PendingTransferStatus::Cancelled,
        ] {
            assert_eq!(transfer_status(&db_transfer_status(s).unwrap()).unwrap(), s);
        }
    }

    #[test]
    fn test_malformed_rows_surface_as_backend_errors() {
        assert!(matches!(
            coins(Decimal::new(1, 3)),
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(
            transaction_type_label("lottery"),
            Err(StoreError::Backend(msg)) if msg.contains("lottery")
        ));
    }
}
