//! Tests for LedgerService against the in-memory store.

use chrono::Duration;

use kudos_shared::types::{EmployeeId, PageRequest, TransactionId, WellnessSubmissionId};

use super::*;
use crate::store::{LedgerStore, StoreError};
use crate::testing::{Harness, coins};

#[tokio::test]
async fn test_overdraft_leaves_transaction_pending_and_balance_untouched() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(10_000).await;

    let purchase = ledger
        .create_pending(NewTransaction::new(account.id, TransactionType::StorePurchase, coins(15_000)))
        .await
        .unwrap();
    let err = ledger.post(purchase.id).await.unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(h.balance(&account).await, coins(10_000));
    let stored = h.store.transaction(purchase.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(stored.posted_at, None);
}

#[tokio::test]
async fn test_post_credit_and_debit() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(0).await;

    let bonus = ledger
        .create_pending(NewTransaction::new(account.id, TransactionType::DailyBonus, coins(500)))
        .await
        .unwrap();
    assert_eq!(h.balance(&account).await, coins(0));

    let posted = ledger.post(bonus.id).await.unwrap();
    assert_eq!(posted.status, TransactionStatus::Posted);
    assert_eq!(posted.posted_at, Some(crate::testing::start()));
    assert_eq!(h.balance(&account).await, coins(500));

    ledger
        .create_and_post(NewTransaction::new(account.id, TransactionType::GameBet, coins(200)))
        .await
        .unwrap();
    assert_eq!(h.balance(&account).await, coins(300));
}

#[tokio::test]
async fn test_terminal_transactions_cannot_move() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(1_000).await;

    let posted = ledger
        .create_and_post(NewTransaction::new(account.id, TransactionType::StorePurchase, coins(400)))
        .await
        .unwrap();
    assert!(matches!(
        ledger.reject(posted.id, None).await,
        Err(LedgerError::NotPending { status: TransactionStatus::Posted, .. })
    ));
    assert!(matches!(
        ledger.post(posted.id).await,
        Err(LedgerError::NotPending { .. })
    ));
    assert_eq!(h.balance(&account).await, coins(600));

    let pending = ledger
        .create_pending(NewTransaction::new(account.id, TransactionType::JackpotWin, coins(50)))
        .await
        .unwrap();
    let rejected = ledger
        .reject(pending.id, Some("duplicate spin".into()))
        .await
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("duplicate spin"));
    assert!(matches!(
        ledger.post(pending.id).await,
        Err(LedgerError::NotPending { status: TransactionStatus::Rejected, .. })
    ));
    assert_eq!(h.balance(&account).await, coins(600));
}

#[tokio::test]
async fn test_create_and_post_persists_nothing_on_overdraft() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(100).await;

    let err = ledger
        .create_and_post(NewTransaction::new(account.id, TransactionType::PredictionBet, coins(101)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let history = ledger
        .get_history(account.id, &HistoryFilter::default(), PageRequest::default())
        .await
        .unwrap();
    // Only the opening adjustment.
    assert_eq!(history.meta.total, 1);
}

#[tokio::test]
async fn test_validation_errors() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(0).await;

    assert!(matches!(
        ledger
            .create_pending(NewTransaction::new(account.id, TransactionType::DailyBonus, coins(0)))
            .await,
        Err(LedgerError::NonPositiveAmount(_))
    ));
    assert!(matches!(
        ledger
            .create_pending(NewTransaction::new(
                kudos_shared::types::AccountId::new(),
                TransactionType::DailyBonus,
                coins(10)
            ))
            .await,
        Err(LedgerError::AccountNotFound(_))
    ));
    assert!(matches!(
        ledger.post(TransactionId::new()).await,
        Err(LedgerError::TransactionNotFound(_))
    ));
}

#[tokio::test]
async fn test_wellness_submission_rewarded_once() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(0).await;
    let submission = WellnessSubmissionId::new();

    let reward = || {
        NewTransaction::new(account.id, TransactionType::WellnessReward, coins(250))
            .for_submission(submission)
    };
    ledger.create_and_post(reward()).await.unwrap();
    assert!(matches!(
        ledger.create_and_post(reward()).await,
        Err(LedgerError::DuplicateWellnessReward(id)) if id == submission
    ));
    assert_eq!(h.balance(&account).await, coins(250));
}

#[tokio::test]
async fn test_adjust_uses_sign_for_type() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(1_000).await;

    let debit = ledger.adjust(account.id, coins(-300), "correction").await.unwrap();
    assert_eq!(debit.transaction_type, TransactionType::AdjustmentDebit);
    assert_eq!(debit.amount, coins(300));
    assert_eq!(debit.description, "correction");
    assert_eq!(h.balance(&account).await, coins(700));

    assert!(matches!(
        ledger.adjust(account.id, coins(0), "noop").await,
        Err(LedgerError::ZeroAdjustment)
    ));
    assert!(matches!(
        ledger.adjust(account.id, coins(-701), "too much").await,
        Err(LedgerError::InsufficientFunds { .. })
    ));
}

#[tokio::test]
async fn test_balance_includes_pending_net() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(1_000).await;

    ledger
        .create_pending(NewTransaction::new(account.id, TransactionType::PredictionWin, coins(300)))
        .await
        .unwrap();
    ledger
        .create_pending(NewTransaction::new(account.id, TransactionType::StorePurchase, coins(500)))
        .await
        .unwrap();

    let posted_only = ledger.get_balance(account.id, false).await.unwrap();
    assert_eq!(posted_only.posted, coins(1_000));
    assert_eq!(posted_only.pending, coins(0));
    assert_eq!(posted_only.total, coins(1_000));

    let with_pending = ledger.get_balance(account.id, true).await.unwrap();
    assert_eq!(with_pending.pending, coins(-200));
    assert_eq!(with_pending.total, coins(800));
}

#[tokio::test]
async fn test_history_newest_first_with_paging_and_filters() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(0).await;

    let mut ids = Vec::new();
    for minor in [100, 200, 300] {
        h.clock.advance(Duration::minutes(1));
        let tx = ledger
            .create_and_post(NewTransaction::new(account.id, TransactionType::DailyBonus, coins(minor)))
            .await
            .unwrap();
        ids.push(tx.id);
    }
    h.clock.advance(Duration::minutes(1));
    let pending = ledger
        .create_pending(NewTransaction::new(account.id, TransactionType::GameWin, coins(50)))
        .await
        .unwrap();

    let first = ledger
        .get_history(account.id, &HistoryFilter::default(), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(first.meta.total, 4);
    assert_eq!(first.meta.total_pages, 2);
    let first_ids: Vec<_> = first.data.iter().map(|tx| tx.id).collect();
    assert_eq!(first_ids, vec![pending.id, ids[2]]);

    let second = ledger
        .get_history(account.id, &HistoryFilter::default(), PageRequest::new(2, 2))
        .await
        .unwrap();
    let second_ids: Vec<_> = second.data.iter().map(|tx| tx.id).collect();
    assert_eq!(second_ids, vec![ids[1], ids[0]]);

    let posted = HistoryFilter {
        status: Some(TransactionStatus::Posted),
        ..HistoryFilter::default()
    };
    let page = ledger
        .get_history(account.id, &posted, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.meta.total, 3);
}

#[tokio::test]
async fn test_history_page_size_is_clamped() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(0).await;

    let page = ledger
        .get_history(account.id, &HistoryFilter::default(), PageRequest::new(0, 10_000))
        .await
        .unwrap();
    assert_eq!(page.meta.page, 1);
    assert_eq!(page.meta.per_page, 100);
}

#[tokio::test]
async fn test_serialization_failures_are_retried() {
    let h = Harness::new();
    let ledger = h.ledger();
    let account = h.funded_account(0).await;

    h.store.fail_next_commits(2);
    ledger
        .create_and_post(NewTransaction::new(account.id, TransactionType::BulkImport, coins(900)))
        .await
        .unwrap();
    assert_eq!(h.balance(&account).await, coins(900));

    h.store.fail_next_commits(10);
    let err = ledger
        .create_and_post(NewTransaction::new(account.id, TransactionType::BulkImport, coins(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Store(StoreError::SerializationFailure)));
    assert_eq!(h.balance(&account).await, coins(900));
    h.store.fail_next_commits(0);
}

#[tokio::test]
async fn test_find_or_create_account_is_stable() {
    let h = Harness::new();
    let ledger = h.ledger();
    let employee = EmployeeId::new();

    let first = ledger.find_or_create_account(employee).await.unwrap();
    let second = ledger.find_or_create_account(employee).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.balance, coins(0));
}
