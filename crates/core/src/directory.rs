//! Employee lookup by email.
//!
//! Identity lives outside the ledger. The transfer coordinator only needs to
//! know whether an email belongs to a registered employee, and which one.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use kudos_shared::types::EmployeeId;

use crate::transfer::normalize_email;

/// Directory lookup failure.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The backing identity service could not be reached.
    #[error("Employee directory unavailable: {0}")]
    Unavailable(String),
}

/// Resolves employees by email and back.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// The employee registered under a normalised email.
    async fn employee_for_email(&self, email: &str) -> Result<Option<EmployeeId>, DirectoryError>;

    /// The normalised email of an employee.
    async fn email_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<String>, DirectoryError>;
}

/// A directory held in memory; registrations are visible immediately.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    by_email: RwLock<HashMap<String, EmployeeId>>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) an employee under `email`.
    pub fn register(&self, email: &str, employee_id: EmployeeId) {
        self.by_email
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_email(email), employee_id);
    }
}

#[async_trait]
impl EmployeeDirectory for StaticDirectory {
    async fn employee_for_email(&self, email: &str) -> Result<Option<EmployeeId>, DirectoryError> {
        Ok(self
            .by_email
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_email(email))
            .copied())
    }

    async fn email_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<String>, DirectoryError> {
        Ok(self
            .by_email
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, id)| **id == employee_id)
            .map(|(email, _)| email.clone()))
    }
}
