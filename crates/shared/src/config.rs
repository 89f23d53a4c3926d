//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger behaviour.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Manager allotment defaults.
    #[serde(default)]
    pub allotment: AllotmentConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    8
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// How many times a unit of work is retried after a serialization failure.
    #[serde(default = "default_max_serialization_retries")]
    pub max_serialization_retries: u32,
    /// Upper bound for `per_page` on history queries.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_max_serialization_retries() -> u32 {
    3
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_serialization_retries: default_max_serialization_retries(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Defaults applied when a manager's first allotment period is created.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllotmentConfig {
    /// Budget for a first monthly period.
    #[serde(default)]
    pub default_monthly_budget: Decimal,
    /// Budget for a first quarterly period.
    #[serde(default)]
    pub default_quarterly_budget: Decimal,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "kudos=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
    /// then `KUDOS__SECTION__KEY` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("KUDOS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
