//! Wiring shared by the service test suites.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;

use kudos_shared::config::{AllotmentConfig, LedgerConfig};
use kudos_shared::types::{Coins, EmployeeId};

use crate::allotment::AllotmentService;
use crate::clock::FixedClock;
use crate::directory::StaticDirectory;
use crate::ledger::{Account, LedgerService};
use crate::notify::RecordingNotifier;
use crate::reconcile::ReconciliationService;
use crate::store::{InMemoryStore, LedgerStore};
use crate::transfer::TransferService;

pub(crate) const RETRIES: u32 = 3;

pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 15, 12, 0, 0).unwrap()
}

pub(crate) fn coins(minor: i64) -> Coins {
    Coins::from_minor(minor)
}

pub(crate) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub directory: Arc<StaticDirectory>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(FixedClock::new(start())),
            directory: Arc::new(StaticDirectory::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    pub fn ledger(&self) -> LedgerService {
        LedgerService::new(self.store(), self.clock.clone(), LedgerConfig::default())
    }

    /// Monthly budget 100.00, quarterly 300.00.
    pub fn allotments(&self) -> AllotmentService {
        let config = AllotmentConfig {
            default_monthly_budget: dec!(100.00),
            default_quarterly_budget: dec!(300.00),
        };
        AllotmentService::new(self.store(), self.clock.clone(), config, RETRIES)
    }

    pub fn transfers(&self) -> TransferService {
        TransferService::new(
            self.store(),
            self.directory.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            RETRIES,
        )
    }

    pub fn reconciler(&self) -> ReconciliationService {
        ReconciliationService::new(self.store(), self.clock.clone())
    }

    /// An account for a fresh employee, credited with `minor` units.
    pub async fn funded_account(&self, minor: i64) -> Account {
        let ledger = self.ledger();
        let account = ledger.find_or_create_account(EmployeeId::new()).await.unwrap();
        if minor > 0 {
            ledger.adjust(account.id, coins(minor), "opening balance").await.unwrap();
        }
        self.store.account(account.id).await.unwrap().unwrap()
    }

    pub async fn balance(&self, account: &Account) -> Coins {
        self.store.account(account.id).await.unwrap().unwrap().balance
    }

    /// Waits until `n` notifications have been recorded.
    pub async fn notifications(&self, n: usize) -> Vec<crate::notify::SentNotification> {
        for _ in 0..100 {
            let sent = self.notifier.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::task::yield_now().await;
        }
        self.notifier.sent()
    }
}
