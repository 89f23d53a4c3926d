//! Pending transfer coordinator.
//!
//! Coins sent to an email with no employee behind it are debited from the
//! sender immediately and held in escrow as a `PendingTransfer`. The
//! recipient claims them once they exist in the directory; until then the
//! sender may cancel and get them back.
//!
//! ```text
//! pending ──claim──▶ claimed
//!    │
//!    └────cancel───▶ cancelled
//! ```

use std::sync::Arc;

use garde::Validate;
use tracing::{debug, info, warn};

use kudos_shared::types::{AccountId, Coins, EmployeeId, PendingTransferId};

use super::error::TransferError;
use super::types::{
    ClaimFailure, ClaimReport, NewPendingTransfer, PendingTransfer, PendingTransferStatus,
    SendOutcome, normalize_email,
};
use crate::clock::Clock;
use crate::directory::EmployeeDirectory;
use crate::ledger::{
    LedgerError, LedgerService, NewTransaction, PostingRules, TransactionStatus, TransactionType,
};
use crate::notify::{
    Notifier, PENDING_TRANSFER_CANCELLED, PENDING_TRANSFER_CLAIMED, PENDING_TRANSFER_INVITE,
    PENDING_TRANSFER_RECEIVED, TemplateVars, spawn_employee_notification, spawn_notification,
};
use crate::retry::with_retries;
use crate::store::{LedgerStore, StoreError, UnitOfWork};

/// Escrow, claim and cancel operations.
#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl TransferService {
    /// Creates a new transfer service.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
            max_retries,
        }
    }

    /// Escrows coins for an email address.
    ///
    /// The sender's `peer_transfer_sent` debit is posted immediately, in the
    /// same unit as the transfer row. With an `import_job_id`, a retry of
    /// the same (job, email) pair returns the existing transfer.
    pub async fn create(&self, input: NewPendingTransfer) -> Result<PendingTransfer, TransferError> {
        input.validate()?;
        PostingRules::validate_amount(input.amount)?;
        let email = normalize_email(&input.recipient_email);

        let (transfer, created) = with_retries(self.max_retries, move || {
            let input = input.clone();
            let email = email.clone();
            async move {
                let mut uow = self.store.begin().await?;
                let outcome = self.escrow_in(uow.as_mut(), input, email).await?;
                if outcome.1 {
                    uow.commit().await?;
                }
                Ok::<_, TransferError>(outcome)
            }
        })
        .await?;

        if created {
            info!(
                transfer_id = %transfer.id,
                account_id = %transfer.sender_account_id,
                amount = %transfer.amount,
                "coins escrowed for unregistered recipient"
            );
            spawn_notification(
                Arc::clone(&self.notifier),
                transfer.recipient_email.clone(),
                PENDING_TRANSFER_INVITE,
                Self::vars(&transfer),
            );
        } else {
            debug!(transfer_id = %transfer.id, "import retry returned existing transfer");
        }
        Ok(transfer)
    }

    async fn escrow_in(
        &self,
        uow: &mut dyn UnitOfWork,
        input: NewPendingTransfer,
        email: String,
    ) -> Result<(PendingTransfer, bool), TransferError> {
        let now = self.clock.now();

        if let Some(job) = input.import_job_id
            && let Some(existing) = uow.transfer_by_import_key(job, &email).await?
        {
            return Ok((existing, false));
        }

        let sender = uow
            .lock_account(input.sender_account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(input.sender_account_id))?;

        let escrow = NewTransaction::new(sender.id, TransactionType::PeerTransferSent, input.amount)
            .from_employee(sender.employee_id)
            .with_description(format!("Transfer to {email}"));
        let sender_tx = LedgerService::create_and_post_in(uow, escrow, now).await?;

        let transfer = PendingTransfer {
            id: PendingTransferId::new(),
            sender_employee_id: sender.employee_id,
            sender_account_id: sender.id,
            recipient_email: email,
            amount: input.amount,
            message: input.message,
            sender_transaction_id: sender_tx.id,
            status: PendingTransferStatus::Pending,
            import_job_id: input.import_job_id,
            recipient_account_id: None,
            recipient_transaction_id: None,
            refund_transaction_id: None,
            created_at: now,
            resolved_at: None,
        };
        match uow.insert_transfer(&transfer).await {
            Ok(()) => Ok((transfer, true)),
            // A concurrent retry of the same import row won; the next attempt returns it.
            Err(StoreError::UniqueViolation(_)) => Err(StoreError::SerializationFailure.into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Delivers every pending transfer addressed to `recipient_email`.
    ///
    /// Each transfer is claimed in its own unit, oldest first. A failure is
    /// logged and reported and does not stop the others; transfers already
    /// resolved by a concurrent call are skipped. Running `claim` again is
    /// always safe.
    pub async fn claim(&self, recipient_email: &str) -> Result<ClaimReport, TransferError> {
        let email = normalize_email(recipient_email);
        let recipient_id = self
            .directory
            .employee_for_email(&email)
            .await?
            .ok_or_else(|| TransferError::RecipientNotRegistered(email.clone()))?;

        let transfers = self.store.pending_transfers_for(&email).await?;
        let mut report = ClaimReport::default();

        for transfer in transfers {
            let transfer_id = transfer.id;
            let outcome =
                with_retries(self.max_retries, move || self.claim_one(transfer_id, recipient_id))
                    .await;
            match outcome {
                Ok(Some(claimed)) => {
                    self.notify_claimed(&claimed);
                    report.claimed.push(transfer_id);
                }
                Ok(None) => report.skipped.push(transfer_id),
                Err(err) => {
                    warn!(transfer_id = %transfer_id, error = %err, "transfer claim failed");
                    report.failed.push(ClaimFailure {
                        transfer_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            recipient_id = %recipient_id,
            claimed = report.claimed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "claim finished"
        );
        Ok(report)
    }

    async fn claim_one(
        &self,
        transfer_id: PendingTransferId,
        recipient_id: EmployeeId,
    ) -> Result<Option<PendingTransfer>, TransferError> {
        let mut uow = self.store.begin().await?;
        let now = self.clock.now();

        let mut transfer = uow
            .lock_transfer(transfer_id)
            .await?
            .ok_or(TransferError::NotFound(transfer_id))?;
        if transfer.status != PendingTransferStatus::Pending {
            return Ok(None);
        }

        let escrow = uow
            .lock_transaction(transfer.sender_transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transfer.sender_transaction_id))?;
        match escrow.status {
            TransactionStatus::Posted => {}
            TransactionStatus::Pending => {
                LedgerService::post_in(uow.as_mut(), escrow.id, now).await?;
            }
            TransactionStatus::Rejected => {
                return Err(TransferError::EscrowRejected {
                    transfer_id,
                    transaction_id: escrow.id,
                });
            }
        }

        let recipient = uow.find_or_create_account(recipient_id, now).await?;
        let description = transfer
            .message
            .clone()
            .unwrap_or_else(|| "Transfer received".to_string());
        let credit = NewTransaction::new(recipient.id, TransactionType::PeerTransferReceived, transfer.amount)
            .from_employee(transfer.sender_employee_id)
            .to_employee(recipient_id)
            .with_description(description);
        let received = LedgerService::create_and_post_in(uow.as_mut(), credit, now).await?;

        transfer.status = PendingTransferStatus::Claimed;
        transfer.recipient_account_id = Some(recipient.id);
        transfer.recipient_transaction_id = Some(received.id);
        transfer.resolved_at = Some(now);
        uow.update_transfer(&transfer).await?;
        uow.commit().await?;

        info!(
            transfer_id = %transfer.id,
            account_id = %recipient.id,
            amount = %transfer.amount,
            "transfer claimed"
        );
        Ok(Some(transfer))
    }

    /// Cancels a pending transfer and returns the escrow to the sender.
    ///
    /// A still-pending escrow entry is rejected. A posted one is never
    /// rejected; a `peer_transfer_received` refund is posted to the sender
    /// instead.
    pub async fn cancel(
        &self,
        transfer_id: PendingTransferId,
        requesting_employee_id: EmployeeId,
    ) -> Result<PendingTransfer, TransferError> {
        let transfer = with_retries(self.max_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let transfer = self
                .cancel_in(uow.as_mut(), transfer_id, requesting_employee_id)
                .await?;
            uow.commit().await?;
            Ok::<_, TransferError>(transfer)
        })
        .await?;

        info!(
            transfer_id = %transfer.id,
            account_id = %transfer.sender_account_id,
            amount = %transfer.amount,
            refunded = transfer.refund_transaction_id.is_some(),
            "transfer cancelled"
        );
        self.notify_employee(
            transfer.sender_employee_id,
            PENDING_TRANSFER_CANCELLED,
            Self::vars(&transfer),
        );
        Ok(transfer)
    }

    async fn cancel_in(
        &self,
        uow: &mut dyn UnitOfWork,
        transfer_id: PendingTransferId,
        requester: EmployeeId,
    ) -> Result<PendingTransfer, TransferError> {
        let now = self.clock.now();
        let mut transfer = uow
            .lock_transfer(transfer_id)
            .await?
            .ok_or(TransferError::NotFound(transfer_id))?;

        if transfer.sender_employee_id != requester {
            return Err(TransferError::Forbidden {
                transfer_id,
                requester,
            });
        }
        if transfer.status != PendingTransferStatus::Pending {
            return Err(TransferError::InvalidState {
                transfer_id,
                status: transfer.status,
            });
        }

        let escrow = uow
            .lock_transaction(transfer.sender_transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transfer.sender_transaction_id))?;
        match escrow.status {
            TransactionStatus::Pending => {
                LedgerService::reject_in(uow, escrow.id, Some("pending transfer cancelled"), now)
                    .await?;
            }
            TransactionStatus::Posted => {
                let refund = NewTransaction::new(
                    transfer.sender_account_id,
                    TransactionType::AdjustmentCredit,
                    transfer.amount,
                )
                .to_employee(transfer.sender_employee_id)
                .with_description(format!("Refund of cancelled transfer to {}", transfer.recipient_email));
                let refund = LedgerService::create_and_post_in(uow, refund, now).await?;
                transfer.refund_transaction_id = Some(refund.id);
            }
            // The escrow never took effect; nothing to return.
            TransactionStatus::Rejected => {}
        }

        transfer.status = PendingTransferStatus::Cancelled;
        transfer.resolved_at = Some(now);
        uow.update_transfer(&transfer).await?;
        Ok(transfer)
    }

    /// Sends coins to an email: directly if the recipient is registered,
    /// through escrow otherwise.
    pub async fn send(
        &self,
        sender_account_id: AccountId,
        recipient_email: &str,
        amount: Coins,
        message: Option<String>,
    ) -> Result<SendOutcome, TransferError> {
        let input = NewPendingTransfer {
            sender_account_id,
            recipient_email: recipient_email.to_string(),
            amount,
            message,
            import_job_id: None,
        };
        input.validate()?;
        PostingRules::validate_amount(amount)?;

        let email = normalize_email(recipient_email);
        let Some(recipient_id) = self.directory.employee_for_email(&email).await? else {
            return self.create(input).await.map(SendOutcome::Escrowed);
        };

        let message = input.message;
        let outcome = with_retries(self.max_retries, move || {
            let message = message.clone();
            async move {
                let mut uow = self.store.begin().await?;
                let outcome = self
                    .direct_in(uow.as_mut(), sender_account_id, recipient_id, amount, message)
                    .await?;
                uow.commit().await?;
                Ok::<_, TransferError>(outcome)
            }
        })
        .await?;

        if let SendOutcome::Direct { sent, received } = &outcome {
            info!(
                account_id = %sent.account_id,
                recipient_account_id = %received.account_id,
                amount = %amount,
                "peer transfer posted"
            );
        }
        Ok(outcome)
    }

    async fn direct_in(
        &self,
        uow: &mut dyn UnitOfWork,
        sender_account_id: AccountId,
        recipient_id: EmployeeId,
        amount: Coins,
        message: Option<String>,
    ) -> Result<SendOutcome, TransferError> {
        let now = self.clock.now();
        let sender = uow
            .lock_account(sender_account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(sender_account_id))?;
        if sender.employee_id == recipient_id {
            return Err(TransferError::SelfTransfer);
        }

        let description = message.unwrap_or_else(|| "Peer transfer".to_string());
        let debit = NewTransaction::new(sender.id, TransactionType::PeerTransferSent, amount)
            .from_employee(sender.employee_id)
            .to_employee(recipient_id)
            .with_description(description.clone());
        let sent = LedgerService::create_and_post_in(uow, debit, now).await?;

        let recipient = uow.find_or_create_account(recipient_id, now).await?;
        let credit = NewTransaction::new(recipient.id, TransactionType::PeerTransferReceived, amount)
            .from_employee(sender.employee_id)
            .to_employee(recipient_id)
            .with_description(description);
        let received = LedgerService::create_and_post_in(uow, credit, now).await?;

        Ok(SendOutcome::Direct { sent, received })
    }

    /// Transfers created by a sender, newest first.
    pub async fn list_for_sender(
        &self,
        sender_employee_id: EmployeeId,
        status: Option<PendingTransferStatus>,
    ) -> Result<Vec<PendingTransfer>, TransferError> {
        Ok(self
            .store
            .transfers_by_sender(sender_employee_id, status)
            .await?)
    }

    fn vars(transfer: &PendingTransfer) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("transfer_id".into(), transfer.id.to_string());
        vars.insert("amount".into(), transfer.amount.to_string());
        vars.insert("recipient_email".into(), transfer.recipient_email.clone());
        vars.insert("sender_employee_id".into(), transfer.sender_employee_id.to_string());
        if let Some(message) = &transfer.message {
            vars.insert("message".into(), message.clone());
        }
        vars
    }

    fn notify_claimed(&self, transfer: &PendingTransfer) {
        spawn_notification(
            Arc::clone(&self.notifier),
            transfer.recipient_email.clone(),
            PENDING_TRANSFER_RECEIVED,
            Self::vars(transfer),
        );
        self.notify_employee(
            transfer.sender_employee_id,
            PENDING_TRANSFER_CLAIMED,
            Self::vars(transfer),
        );
    }

    fn notify_employee(
        &self,
        employee_id: EmployeeId,
        template_key: &'static str,
        vars: TemplateVars,
    ) {
        spawn_employee_notification(
            Arc::clone(&self.directory),
            Arc::clone(&self.notifier),
            employee_id,
            template_key,
            vars,
        );
    }
}
