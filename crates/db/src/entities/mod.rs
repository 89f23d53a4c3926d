//! `SeaORM` entity definitions for the ledger tables.

pub mod accounts;
pub mod ledger_transactions;
pub mod manager_allotments;
pub mod pending_transfers;
pub mod sea_orm_active_enums;
