//! Core business logic for the kudos coin ledger.
//!
//! This crate contains the balance engine with ZERO web or database
//! dependencies. Persistence is reached through the [`store`] traits so the
//! same algorithms run against Postgres (`kudos-db`) and the in-memory store.
//!
//! # Modules
//!
//! - `ledger` - Transaction state machine, classification table, balances
//! - `allotment` - Per-manager periodic award budgets
//! - `transfer` - Escrowed transfers to not-yet-registered recipients
//! - `reconcile` - Read-only balance drift detection
//! - `store` - Persistence traits, unit of work, in-memory implementation
//! - `clock`, `directory`, `notify` - Collaborator seams

pub mod allotment;
pub mod clock;
pub mod directory;
pub mod ledger;
pub mod notify;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use kudos_shared::types::Coins;
