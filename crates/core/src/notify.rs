//! Outbound notifications.
//!
//! Delivery is fire-and-forget: it happens after the ledger unit has
//! committed, on a spawned task, and a failure is logged and dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kudos_shared::types::EmployeeId;

use crate::directory::EmployeeDirectory;

/// Invitation sent to an unregistered recipient when coins are escrowed.
pub const PENDING_TRANSFER_INVITE: &str = "pending_transfer_invite";
/// Sent to the recipient once escrowed coins land in their account.
pub const PENDING_TRANSFER_RECEIVED: &str = "pending_transfer_received";
/// Sent to the sender when the recipient claims.
pub const PENDING_TRANSFER_CLAIMED: &str = "pending_transfer_claimed";
/// Sent to the sender when a transfer is cancelled and refunded.
pub const PENDING_TRANSFER_CANCELLED: &str = "pending_transfer_cancelled";

/// Template variables.
pub type TemplateVars = BTreeMap<String, String>;

/// Notification delivery failure.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// The transport refused or failed the message.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Sends templated messages to an email address.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one message.
    async fn notify(
        &self,
        email: &str,
        template_key: &str,
        vars: &TemplateVars,
    ) -> Result<(), NotifyError>;
}

async fn deliver(notifier: &dyn Notifier, email: &str, template_key: &str, vars: &TemplateVars) {
    if let Err(err) = notifier.notify(email, template_key, vars).await {
        warn!(template_key, email, error = %err, "notification dropped");
    }
}

/// Spawns delivery of one notification. The returned handle may be ignored.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    email: String,
    template_key: &'static str,
    vars: TemplateVars,
) -> JoinHandle<()> {
    tokio::spawn(async move { deliver(notifier.as_ref(), &email, template_key, &vars).await })
}

/// Spawns delivery to an employee whose address is looked up on the spawned
/// task. A failed or empty lookup is logged and dropped like a failed send.
pub fn spawn_employee_notification(
    directory: Arc<dyn EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    employee_id: EmployeeId,
    template_key: &'static str,
    vars: TemplateVars,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match directory.email_for_employee(employee_id).await {
            Ok(Some(email)) => deliver(notifier.as_ref(), &email, template_key, &vars).await,
            Ok(None) => {
                debug!(employee_id = %employee_id, template_key, "no email on file, notification skipped");
            }
            Err(err) => {
                warn!(employee_id = %employee_id, template_key, error = %err, "notification dropped");
            }
        }
    })
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        email: &str,
        template_key: &str,
        vars: &TemplateVars,
    ) -> Result<(), NotifyError> {
        info!(template_key, email, ?vars, "notification");
        Ok(())
    }
}

/// One captured notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    /// Recipient.
    pub email: String,
    /// Template key.
    pub template_key: String,
    /// Template variables.
    pub vars: TemplateVars,
}

/// Captures notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        email: &str,
        template_key: &str,
        vars: &TemplateVars,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentNotification {
                email: email.to_string(),
                template_key: template_key.to_string(),
                vars: vars.clone(),
            });
        Ok(())
    }
}
