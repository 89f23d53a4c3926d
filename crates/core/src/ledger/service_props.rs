//! Property-based tests for LedgerService.
//!
//! - Conservation: stored balances always equal the signed sum of posted entries
//! - No overdraft: no sequence of operations takes a balance below zero
//! - Terminal states: posted and rejected entries never change again
//! - Claims are idempotent: a second claim delivers nothing

use proptest::prelude::*;

use kudos_shared::types::Coins;

use super::types::{NewTransaction, TransactionStatus, TransactionType};
use super::{LedgerError, LedgerTransaction};
use crate::store::LedgerStore;
use crate::testing::{Harness, coins};
use crate::transfer::NewPendingTransfer;

/// Strategy to generate amounts (0.01 to 500.00).
fn amount() -> impl Strategy<Value = i64> {
    1i64..50_000i64
}

/// Strategy to pick any transaction type.
fn transaction_type() -> impl Strategy<Value = TransactionType> {
    proptest::sample::select(TransactionType::ALL.to_vec())
}

/// What to do with a pending entry.
#[derive(Debug, Clone, Copy)]
enum Step {
    Post,
    Reject,
    Leave,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Post), Just(Step::Reject), Just(Step::Leave)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Signed sum of posted entries, straight from history.
fn posted_sum(rows: &[LedgerTransaction]) -> Coins {
    rows.iter()
        .filter(|tx| tx.status == TransactionStatus::Posted)
        .map(LedgerTransaction::signed_amount)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any mix of credits and debits keeps balance == posted sum and >= 0.
    #[test]
    fn prop_balance_is_conserved(ops in prop::collection::vec((transaction_type(), amount()), 1..30)) {
        let (balance, sum, clean, overdrafts_refused) = runtime().block_on(async {
            let h = Harness::new();
            let ledger = h.ledger();
            let account = h.funded_account(0).await;
            let mut refused = true;

            for (t, minor) in ops {
                match ledger.create_and_post(NewTransaction::new(account.id, t, coins(minor))).await {
                    Ok(_) => {}
                    Err(LedgerError::InsufficientFunds { .. }) => {
                        refused &= !t.is_credit();
                    }
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }

            let rows = h
                .store
                .history(account.id, &super::HistoryFilter::default(), kudos_shared::types::PageRequest::new(1, 100))
                .await
                .unwrap()
                .0;
            let report = h.reconciler().reconcile().await.unwrap();
            (h.balance(&account).await, posted_sum(&rows), report.is_clean(), refused)
        });

        prop_assert_eq!(balance, sum);
        prop_assert!(!balance.is_negative());
        prop_assert!(clean);
        prop_assert!(overdrafts_refused);
    }

    /// Once an entry is posted or rejected, later steps cannot move it.
    #[test]
    fn prop_terminal_states_stick(
        entries in prop::collection::vec((transaction_type(), amount(), step(), step()), 1..15),
    ) {
        let violations = runtime().block_on(async {
            let h = Harness::new();
            let ledger = h.ledger();
            let account = h.funded_account(100_000).await;
            let mut violations = Vec::new();

            for (t, minor, first, second) in entries {
                let tx = ledger
                    .create_pending(NewTransaction::new(account.id, t, coins(minor)))
                    .await
                    .unwrap();

                for step in [first, second] {
                    let before = h.store.transaction(tx.id).await.unwrap().unwrap();
                    let balance_before = h.balance(&account).await;
                    let outcome = match step {
                        Step::Post => ledger.post(tx.id).await.map(|_| ()),
                        Step::Reject => ledger.reject(tx.id, None).await.map(|_| ()),
                        Step::Leave => Ok(()),
                    };
                    let after = h.store.transaction(tx.id).await.unwrap().unwrap();

                    if before.status != TransactionStatus::Pending {
                        let refused = matches!(outcome, Err(LedgerError::NotPending { .. }))
                            || matches!(step, Step::Leave);
                        if !refused
                            || after != before
                            || h.balance(&account).await != balance_before
                        {
                            violations.push(tx.id);
                        }
                    }
                }
            }
            violations
        });

        prop_assert!(violations.is_empty(), "terminal entries changed: {:?}", violations);
    }

    /// Claiming twice never delivers twice.
    #[test]
    fn prop_claim_is_idempotent(amounts in prop::collection::vec(amount(), 1..6)) {
        let (first, second, received, expected, escrow_left) = runtime().block_on(async {
            let h = Harness::new();
            let transfers = h.transfers();
            let sender = h.funded_account(amounts.iter().sum()).await;

            for minor in &amounts {
                transfers
                    .create(NewPendingTransfer {
                        sender_account_id: sender.id,
                        recipient_email: "new.hire@example.com".into(),
                        amount: coins(*minor),
                        message: None,
                        import_job_id: None,
                    })
                    .await
                    .unwrap();
            }

            let recipient = kudos_shared::types::EmployeeId::new();
            h.directory.register("new.hire@example.com", recipient);
            let first = transfers.claim("new.hire@example.com").await.unwrap();
            let second = transfers.claim("New.Hire@example.com").await.unwrap();

            let account = h.store.account_by_employee(recipient).await.unwrap().unwrap();
            let escrow = h.store.escrow_summary().await.unwrap();
            (
                first.claimed.len(),
                second.claimed.len(),
                account.balance,
                coins(amounts.iter().sum()),
                escrow.count,
            )
        });

        prop_assert_eq!(first, amounts.len());
        prop_assert_eq!(second, 0);
        prop_assert_eq!(received, expected);
        prop_assert_eq!(escrow_left, 0);
    }
}
