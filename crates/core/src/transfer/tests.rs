//! Tests for TransferService against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use kudos_shared::types::{
    EmployeeId, ImportJobId, PendingTransferId, TransactionId,
};

use super::*;
use crate::directory::{DirectoryError, EmployeeDirectory, StaticDirectory};
use crate::ledger::{
    Account, LedgerError, NewTransaction, TransactionStatus, TransactionType,
};
use crate::notify::{
    PENDING_TRANSFER_CANCELLED, PENDING_TRANSFER_CLAIMED, PENDING_TRANSFER_INVITE,
    PENDING_TRANSFER_RECEIVED,
};
use crate::store::{LedgerStore, UnitOfWork};
use crate::testing::{Harness, RETRIES, coins, start};

const SENDER_EMAIL: &str = "sender@co.com";
const NEW_HIRE: &str = "new@co.com";

async fn registered_sender(h: &Harness, minor: i64) -> Account {
    let account = h.funded_account(minor).await;
    h.directory.register(SENDER_EMAIL, account.employee_id);
    account
}

fn escrow(sender: &Account, minor: i64) -> NewPendingTransfer {
    NewPendingTransfer {
        sender_account_id: sender.id,
        recipient_email: NEW_HIRE.into(),
        amount: coins(minor),
        message: None,
        import_job_id: None,
    }
}

/// A transfer row written straight to the store, bypassing the service.
fn raw_transfer(
    sender: &Account,
    sender_transaction_id: TransactionId,
    minor: i64,
    created_at: DateTime<Utc>,
) -> PendingTransfer {
    PendingTransfer {
        id: PendingTransferId::new(),
        sender_employee_id: sender.employee_id,
        sender_account_id: sender.id,
        recipient_email: NEW_HIRE.into(),
        amount: coins(minor),
        message: None,
        sender_transaction_id,
        status: PendingTransferStatus::Pending,
        import_job_id: None,
        recipient_account_id: None,
        recipient_transaction_id: None,
        refund_transaction_id: None,
        created_at,
        resolved_at: None,
    }
}

async fn insert_raw(h: &Harness, transfer: &PendingTransfer) {
    let mut uow = h.store.begin().await.unwrap();
    uow.insert_transfer(transfer).await.unwrap();
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn test_escrow_then_claim() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;

    let transfer = transfers
        .create(NewPendingTransfer {
            recipient_email: "  New@Co.com ".into(),
            message: Some("welcome aboard".into()),
            ..escrow(&sender, 2_000)
        })
        .await
        .unwrap();
    assert_eq!(transfer.status, PendingTransferStatus::Pending);
    assert_eq!(transfer.recipient_email, NEW_HIRE);
    assert_eq!(h.balance(&sender).await, coins(8_000));

    let escrowed = h.store.escrow_summary().await.unwrap();
    assert_eq!(escrowed.count, 1);
    assert_eq!(escrowed.amount, coins(2_000));

    let recipient = EmployeeId::new();
    h.directory.register(NEW_HIRE, recipient);
    let report = transfers.claim(NEW_HIRE).await.unwrap();
    assert_eq!(report.claimed, vec![transfer.id]);
    assert!(report.is_clean());

    let account = h.store.account_by_employee(recipient).await.unwrap().unwrap();
    assert_eq!(account.balance, coins(2_000));

    let claimed = h.store.pending_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(claimed.status, PendingTransferStatus::Claimed);
    assert_eq!(claimed.recipient_account_id, Some(account.id));
    assert_eq!(claimed.resolved_at, Some(start()));
    let received = h
        .store
        .transaction(claimed.recipient_transaction_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.transaction_type, TransactionType::PeerTransferReceived);
    assert_eq!(received.status, TransactionStatus::Posted);
    assert_eq!(received.description, "welcome aboard");
    assert_eq!(received.source_employee_id, Some(sender.employee_id));

    assert_eq!(h.store.escrow_summary().await.unwrap().count, 0);
    assert!(h.reconciler().reconcile().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_claim_notifies_both_sides() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;

    transfers.create(escrow(&sender, 500)).await.unwrap();
    let invite = h.notifications(1).await;
    assert_eq!(invite[0].email, NEW_HIRE);
    assert_eq!(invite[0].template_key, PENDING_TRANSFER_INVITE);
    assert_eq!(invite[0].vars.get("amount").map(String::as_str), Some("5.00"));

    h.directory.register(NEW_HIRE, EmployeeId::new());
    transfers.claim(NEW_HIRE).await.unwrap();

    let sent = h.notifications(3).await;
    assert_eq!(sent.len(), 3);
    assert!(
        sent.iter()
            .any(|n| n.email == NEW_HIRE && n.template_key == PENDING_TRANSFER_RECEIVED)
    );
    assert!(
        sent.iter()
            .any(|n| n.email == SENDER_EMAIL && n.template_key == PENDING_TRANSFER_CLAIMED)
    );
}

#[tokio::test]
async fn test_claim_requires_registration() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 1_000).await;
    transfers.create(escrow(&sender, 500)).await.unwrap();

    assert!(matches!(
        transfers.claim(NEW_HIRE).await,
        Err(TransferError::RecipientNotRegistered(email)) if email == NEW_HIRE
    ));
    assert_eq!(h.store.escrow_summary().await.unwrap().count, 1);
}

#[tokio::test]
async fn test_cancel_refunds_sender() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;
    let transfer = transfers.create(escrow(&sender, 3_000)).await.unwrap();
    assert_eq!(h.balance(&sender).await, coins(7_000));

    h.clock.advance(Duration::hours(1));
    let cancelled = transfers.cancel(transfer.id, sender.employee_id).await.unwrap();
    assert_eq!(cancelled.status, PendingTransferStatus::Cancelled);
    assert_eq!(h.balance(&sender).await, coins(10_000));

    // The posted escrow stays posted; a refund entry balances it.
    let escrow_tx = h
        .store
        .transaction(transfer.sender_transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escrow_tx.status, TransactionStatus::Posted);
    let refund = h
        .store
        .transaction(cancelled.refund_transaction_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refund.transaction_type, TransactionType::AdjustmentCredit);
    assert_eq!(refund.amount, coins(3_000));
    assert_eq!(refund.source_employee_id, None);
    assert!(refund.description.starts_with("Refund of cancelled transfer"));

    let sent = h.notifications(2).await;
    assert!(
        sent.iter()
            .any(|n| n.email == SENDER_EMAIL && n.template_key == PENDING_TRANSFER_CANCELLED)
    );
    assert!(h.reconciler().reconcile().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_cancel_guards() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;
    let transfer = transfers.create(escrow(&sender, 1_000)).await.unwrap();

    let stranger = EmployeeId::new();
    assert!(matches!(
        transfers.cancel(transfer.id, stranger).await,
        Err(TransferError::Forbidden { requester, .. }) if requester == stranger
    ));
    assert!(matches!(
        transfers.cancel(PendingTransferId::new(), sender.employee_id).await,
        Err(TransferError::NotFound(_))
    ));

    transfers.cancel(transfer.id, sender.employee_id).await.unwrap();
    assert!(matches!(
        transfers.cancel(transfer.id, sender.employee_id).await,
        Err(TransferError::InvalidState { status: PendingTransferStatus::Cancelled, .. })
    ));
    assert_eq!(h.balance(&sender).await, coins(10_000));

    let claimed = transfers.create(escrow(&sender, 1_000)).await.unwrap();
    h.directory.register(NEW_HIRE, EmployeeId::new());
    transfers.claim(NEW_HIRE).await.unwrap();
    assert!(matches!(
        transfers.cancel(claimed.id, sender.employee_id).await,
        Err(TransferError::InvalidState { status: PendingTransferStatus::Claimed, .. })
    ));
    // Cancelled transfers are not claimed.
    let cancelled = h.store.pending_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, PendingTransferStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_rejects_pending_escrow() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 5_000).await;

    let pending = h
        .ledger()
        .create_pending(NewTransaction::new(sender.id, TransactionType::PeerTransferSent, coins(1_500)))
        .await
        .unwrap();
    let transfer = raw_transfer(&sender, pending.id, 1_500, start());
    insert_raw(&h, &transfer).await;

    let cancelled = transfers.cancel(transfer.id, sender.employee_id).await.unwrap();
    assert_eq!(cancelled.refund_transaction_id, None);
    let escrow_tx = h.store.transaction(pending.id).await.unwrap().unwrap();
    assert_eq!(escrow_tx.status, TransactionStatus::Rejected);
    assert_eq!(h.balance(&sender).await, coins(5_000));
}

#[tokio::test]
async fn test_claim_posts_pending_escrow_first() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 5_000).await;

    let pending = h
        .ledger()
        .create_pending(NewTransaction::new(sender.id, TransactionType::PeerTransferSent, coins(1_500)))
        .await
        .unwrap();
    insert_raw(&h, &raw_transfer(&sender, pending.id, 1_500, start())).await;

    h.directory.register(NEW_HIRE, EmployeeId::new());
    let report = transfers.claim(NEW_HIRE).await.unwrap();
    assert_eq!(report.claimed.len(), 1);
    assert_eq!(h.balance(&sender).await, coins(3_500));
    assert!(h.reconciler().reconcile().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_one_failed_claim_does_not_block_others() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;

    // Oldest: its escrow entry does not exist.
    let orphan = raw_transfer(&sender, TransactionId::new(), 700, start() - Duration::days(2));
    insert_raw(&h, &orphan).await;

    // Next: its escrow entry was rejected out of band.
    let rejected = h
        .ledger()
        .create_pending(NewTransaction::new(sender.id, TransactionType::PeerTransferSent, coins(300)))
        .await
        .unwrap();
    h.ledger().reject(rejected.id, None).await.unwrap();
    let voided = raw_transfer(&sender, rejected.id, 300, start() - Duration::days(1));
    insert_raw(&h, &voided).await;

    let good = transfers.create(escrow(&sender, 1_000)).await.unwrap();

    let recipient = EmployeeId::new();
    h.directory.register(NEW_HIRE, recipient);
    let report = transfers.claim(NEW_HIRE).await.unwrap();

    assert_eq!(report.claimed, vec![good.id]);
    let failed: Vec<_> = report.failed.iter().map(|f| f.transfer_id).collect();
    assert_eq!(failed, vec![orphan.id, voided.id]);
    assert!(report.failed[1].reason.contains("rejected"));

    let account = h.store.account_by_employee(recipient).await.unwrap().unwrap();
    assert_eq!(account.balance, coins(1_000));
    let still_pending = h.store.pending_transfer(orphan.id).await.unwrap().unwrap();
    assert_eq!(still_pending.status, PendingTransferStatus::Pending);
}

#[tokio::test]
async fn test_import_retry_is_idempotent() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;
    let job = ImportJobId::new();

    let first = transfers
        .create(NewPendingTransfer {
            import_job_id: Some(job),
            ..escrow(&sender, 2_500)
        })
        .await
        .unwrap();
    let again = transfers
        .create(NewPendingTransfer {
            recipient_email: "NEW@co.com".into(),
            import_job_id: Some(job),
            ..escrow(&sender, 2_500)
        })
        .await
        .unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(h.balance(&sender).await, coins(7_500));
    assert_eq!(h.store.escrow_summary().await.unwrap().count, 1);

    let other_job = transfers
        .create(NewPendingTransfer {
            import_job_id: Some(ImportJobId::new()),
            ..escrow(&sender, 2_500)
        })
        .await
        .unwrap();
    assert_ne!(other_job.id, first.id);
    assert_eq!(h.balance(&sender).await, coins(5_000));
}

#[tokio::test]
async fn test_create_validation() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 1_000).await;

    assert!(matches!(
        transfers
            .create(NewPendingTransfer {
                recipient_email: "not-an-email".into(),
                ..escrow(&sender, 100)
            })
            .await,
        Err(TransferError::Validation(_))
    ));
    assert!(matches!(
        transfers.create(escrow(&sender, 0)).await,
        Err(TransferError::Ledger(LedgerError::NonPositiveAmount(_)))
    ));
    assert!(matches!(
        transfers.create(escrow(&sender, 1_001)).await,
        Err(TransferError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));
    assert_eq!(h.store.escrow_summary().await.unwrap().count, 0);
    assert_eq!(h.balance(&sender).await, coins(1_000));
}

#[tokio::test]
async fn test_send_direct_or_escrow() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;
    let colleague = EmployeeId::new();
    h.directory.register("colleague@co.com", colleague);

    let outcome = transfers
        .send(sender.id, "Colleague@co.com", coins(1_200), Some("thanks".into()))
        .await
        .unwrap();
    let SendOutcome::Direct { sent, received } = outcome else {
        panic!("expected a direct transfer");
    };
    assert_eq!(sent.transaction_type, TransactionType::PeerTransferSent);
    assert_eq!(received.transaction_type, TransactionType::PeerTransferReceived);
    assert_eq!(received.target_employee_id, Some(colleague));
    let colleague_account = h.store.account_by_employee(colleague).await.unwrap().unwrap();
    assert_eq!(colleague_account.balance, coins(1_200));

    let outcome = transfers
        .send(sender.id, NEW_HIRE, coins(800), None)
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Escrowed(ref t) if t.amount == coins(800)));
    assert_eq!(h.balance(&sender).await, coins(8_000));

    assert!(matches!(
        transfers.send(sender.id, SENDER_EMAIL, coins(100), None).await,
        Err(TransferError::SelfTransfer)
    ));
    assert!(matches!(
        transfers.send(sender.id, "colleague@co.com", coins(8_001), None).await,
        Err(TransferError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));
    assert_eq!(h.balance(&sender).await, coins(8_000));
}

#[tokio::test]
async fn test_list_for_sender_newest_first() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 10_000).await;

    let first = transfers.create(escrow(&sender, 100)).await.unwrap();
    h.clock.advance(Duration::minutes(5));
    let second = transfers.create(escrow(&sender, 200)).await.unwrap();
    transfers.cancel(first.id, sender.employee_id).await.unwrap();

    let all = transfers.list_for_sender(sender.employee_id, None).await.unwrap();
    let ids: Vec<_> = all.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let pending = transfers
        .list_for_sender(sender.employee_id, Some(PendingTransferStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
}

#[tokio::test]
async fn test_claim_retries_serialization_failure() {
    let h = Harness::new();
    let transfers = h.transfers();
    let sender = registered_sender(&h, 1_000).await;
    transfers.create(escrow(&sender, 400)).await.unwrap();

    let recipient = EmployeeId::new();
    h.directory.register(NEW_HIRE, recipient);
    h.store.fail_next_commits(1);
    let report = transfers.claim(NEW_HIRE).await.unwrap();
    assert_eq!(report.claimed.len(), 1);

    let account = h.store.account_by_employee(recipient).await.unwrap().unwrap();
    assert_eq!(account.balance, coins(400));
}

/// Resolves registrations like `StaticDirectory` but never answers a
/// reverse lookup.
#[derive(Default)]
struct StalledReverseLookup {
    inner: StaticDirectory,
}

#[async_trait]
impl EmployeeDirectory for StalledReverseLookup {
    async fn employee_for_email(&self, email: &str) -> Result<Option<EmployeeId>, DirectoryError> {
        self.inner.employee_for_email(email).await
    }

    async fn email_for_employee(&self, _: EmployeeId) -> Result<Option<String>, DirectoryError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_stalled_email_lookup_does_not_block_claim_or_cancel() {
    let h = Harness::new();
    let directory = Arc::new(StalledReverseLookup::default());
    let transfers = TransferService::new(
        h.store.clone(),
        directory.clone(),
        h.notifier.clone(),
        h.clock.clone(),
        RETRIES,
    );
    let sender = h.funded_account(10_000).await;
    directory.inner.register(SENDER_EMAIL, sender.employee_id);

    let cancelled = transfers.create(escrow(&sender, 1_000)).await.unwrap();
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        transfers.cancel(cancelled.id, sender.employee_id),
    )
    .await
    .expect("cancel waited on the email lookup");
    assert_eq!(result.unwrap().status, PendingTransferStatus::Cancelled);

    transfers.create(escrow(&sender, 1_000)).await.unwrap();
    transfers.create(escrow(&sender, 2_000)).await.unwrap();
    let recipient = EmployeeId::new();
    directory.inner.register(NEW_HIRE, recipient);
    let report = tokio::time::timeout(std::time::Duration::from_secs(5), transfers.claim(NEW_HIRE))
        .await
        .expect("claim waited on the email lookup")
        .unwrap();
    assert_eq!(report.claimed.len(), 2);

    let account = h.store.account_by_employee(recipient).await.unwrap().unwrap();
    assert_eq!(account.balance, coins(3_000));

    // Recipient addresses are known up front; only sender-side messages wait.
    let sent = h.notifications(5).await;
    assert_eq!(
        sent.iter()
            .filter(|n| n.template_key == PENDING_TRANSFER_RECEIVED)
            .count(),
        2
    );
    assert!(sent.iter().all(|n| n.email == NEW_HIRE));
}
