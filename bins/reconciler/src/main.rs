//! Ledger reconciliation job.
//!
//! Recomputes every account balance from posted history, prints the report
//! as JSON and exits non-zero when any account has drifted.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kudos_core::clock::SystemClock;
use kudos_core::reconcile::ReconciliationService;
use kudos_db::PgLedgerStore;
use kudos_shared::AppConfig;
use kudos_shared::config::LoggingConfig;

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let db = kudos_db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    let store = Arc::new(PgLedgerStore::new(db));
    let reconciler = ReconciliationService::new(store, Arc::new(SystemClock));
    let report = reconciler.reconcile().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
