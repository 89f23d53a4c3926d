//! Postgres persistence for the kudos ledger.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - The [`PgLedgerStore`] implementation of the core store traits
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

pub use migration::Migrator;
pub use repositories::{PgLedgerStore, PgUnitOfWork};

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use kudos_shared::config::DatabaseConfig;

/// Establishes a pooled connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(false);
    Database::connect(options).await
}
