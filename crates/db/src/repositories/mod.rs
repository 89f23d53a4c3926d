//! Postgres implementations of the ledger store traits.

mod error;
mod ledger_store;
mod mapping;
mod unit_of_work;

pub use ledger_store::PgLedgerStore;
pub use unit_of_work::PgUnitOfWork;
