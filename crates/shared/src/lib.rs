//! Shared types, errors, and configuration for the kudos ledger.
//!
//! This crate provides common types used across all other crates:
//! - `Coins`, the two-decimal fixed-point currency amount
//! - Typed IDs for type-safe entity references
//! - Pagination types for history listings
//! - Application-wide error taxonomy
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
