//! Allotment service: periodic award budgets for managers.
//!
//! The budget is a separate accounting domain from the manager's personal
//! balance. Usage is never stored; it is the sum of posted `manager_award`
//! entries the manager sourced inside the period.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use kudos_shared::config::AllotmentConfig;
use kudos_shared::types::{Coins, EmployeeId};

use super::error::AllotmentError;
use super::period::Period;
use super::types::{AllotmentSummary, ManagerAllotment, PeriodType};
use crate::clock::Clock;
use crate::ledger::{LedgerService, LedgerTransaction, NewTransaction, TransactionType};
use crate::retry::with_retries;
use crate::store::{LedgerStore, StoreError, UnitOfWork};

/// A manager award request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardRequest {
    /// Awarding manager.
    pub manager_id: EmployeeId,
    /// Recipient employee.
    pub recipient_id: EmployeeId,
    /// Award amount.
    pub amount: Coins,
    /// Budget period to draw from.
    pub period_type: PeriodType,
    /// Optional description for the ledger entry.
    pub description: Option<String>,
}

/// Result of moving personal coins into the award budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingReceipt {
    /// The posted `allotment_deposit` debit.
    pub transaction: LedgerTransaction,
    /// The budget after funding.
    pub allotment: AllotmentSummary,
}

/// Allotment operations over an injected store.
#[derive(Clone)]
pub struct AllotmentService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: AllotmentConfig,
    max_retries: u32,
}

impl AllotmentService {
    /// Creates a new allotment service.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: AllotmentConfig,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            max_retries,
        }
    }

    fn default_budget(&self, period_type: PeriodType) -> Result<Coins, AllotmentError> {
        let value = match period_type {
            PeriodType::Monthly => self.config.default_monthly_budget,
            PeriodType::Quarterly => self.config.default_quarterly_budget,
        };
        Coins::new(value).map_err(|err| AllotmentError::Ledger(err.into()))
    }

    /// Locks (creating if needed) the current period row and sums its usage.
    async fn current_in(
        &self,
        uow: &mut dyn UnitOfWork,
        manager_id: EmployeeId,
        period_type: PeriodType,
        now: DateTime<Utc>,
    ) -> Result<AllotmentSummary, AllotmentError> {
        let period = Period::containing(period_type, now).ok_or(AllotmentError::PeriodOutOfRange)?;

        let allotment = match uow.lock_allotment(manager_id, period_type, period.start).await? {
            Some(allotment) => allotment,
            None => {
                // New periods inherit the last budget so a recurring amount carries forward.
                let amount = match uow.latest_allotment(manager_id, period_type).await? {
                    Some(previous) => previous.amount,
                    None => self.default_budget(period_type)?,
                };
                let allotment = ManagerAllotment::open(manager_id, period_type, period, amount, now);
                match uow.insert_allotment(&allotment).await {
                    Ok(()) => {}
                    // Another unit created the row first; a fresh attempt will lock it.
                    Err(StoreError::UniqueViolation(_)) => {
                        return Err(StoreError::SerializationFailure.into());
                    }
                    Err(err) => return Err(err.into()),
                }
                debug!(manager_id = %manager_id, period_type = %period_type, amount = %amount, "opened allotment period");
                allotment
            }
        };

        let used = uow.awarded_total(manager_id, period.start, period.end).await?;
        Ok(AllotmentSummary::new(allotment, used))
    }

    async fn mirror_remaining(
        uow: &mut dyn UnitOfWork,
        manager_id: EmployeeId,
        remaining: Coins,
        now: DateTime<Utc>,
    ) -> Result<(), AllotmentError> {
        let account = uow.find_or_create_account(manager_id, now).await?;
        uow.set_allotment_balance(account.id, remaining, now).await?;
        Ok(())
    }

    /// The current period's budget, usage and remainder.
    pub async fn get_current_allotment(
        &self,
        manager_id: EmployeeId,
        period_type: PeriodType,
    ) -> Result<AllotmentSummary, AllotmentError> {
        with_retries(self.max_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let summary = self
                .current_in(uow.as_mut(), manager_id, period_type, self.clock.now())
                .await?;
            uow.commit().await?;
            Ok::<_, AllotmentError>(summary)
        })
        .await
    }

    /// Whether the current period has at least `amount` left.
    pub async fn can_award(
        &self,
        manager_id: EmployeeId,
        amount: Coins,
        period_type: PeriodType,
    ) -> Result<bool, AllotmentError> {
        let summary = self.get_current_allotment(manager_id, period_type).await?;
        Ok(summary.remaining >= amount)
    }

    /// Awards coins from the manager's budget.
    ///
    /// The budget check, the ledger insert and the post run in one unit that
    /// holds the allotment row lock, so two concurrent awards cannot both
    /// spend the same remainder.
    pub async fn award_coins(&self, request: AwardRequest) -> Result<LedgerTransaction, AllotmentError> {
        if !request.amount.is_positive() {
            return Err(AllotmentError::NonPositiveAmount(request.amount));
        }
        with_retries(self.max_retries, move || {
            let request = request.clone();
            async move {
                let mut uow = self.store.begin().await?;
                let tx = self.award_in(uow.as_mut(), request).await?;
                uow.commit().await?;
                Ok::<_, AllotmentError>(tx)
            }
        })
        .await
    }

    async fn award_in(
        &self,
        uow: &mut dyn UnitOfWork,
        request: AwardRequest,
    ) -> Result<LedgerTransaction, AllotmentError> {
        let now = self.clock.now();
        let AwardRequest {
            manager_id,
            recipient_id,
            amount,
            period_type,
            description,
        } = request;

        let summary = self.current_in(uow, manager_id, period_type, now).await?;
        if amount > summary.remaining {
            warn!(
                manager_id = %manager_id,
                requested = %amount,
                remaining = %summary.remaining,
                "award refused, budget exceeded"
            );
            return Err(AllotmentError::BudgetExceeded {
                manager_id,
                requested: amount,
                remaining: summary.remaining,
            });
        }

        let recipient = uow.find_or_create_account(recipient_id, now).await?;
        let mut input = NewTransaction::new(recipient.id, TransactionType::ManagerAward, amount)
            .from_employee(manager_id)
            .to_employee(recipient_id);
        if let Some(description) = description {
            input = input.with_description(description);
        }
        let tx = LedgerService::create_and_post_in(uow, input, now).await?;

        let remaining = summary.remaining - amount;
        Self::mirror_remaining(uow, manager_id, remaining, now).await?;

        info!(
            manager_id = %manager_id,
            recipient_id = %recipient_id,
            transaction_id = %tx.id,
            amount = %amount,
            remaining = %remaining,
            "coins awarded"
        );
        Ok(tx)
    }

    /// Adds `delta` (possibly negative) to the current period's budget.
    pub async fn deposit_allotment(
        &self,
        manager_id: EmployeeId,
        period_type: PeriodType,
        delta: Coins,
    ) -> Result<AllotmentSummary, AllotmentError> {
        with_retries(self.max_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let now = self.clock.now();
            let current = self.current_in(uow.as_mut(), manager_id, period_type, now).await?;
            let budget = current.allotment.amount + delta;
            let summary = Self::set_budget_in(uow.as_mut(), current, budget, now).await?;
            uow.commit().await?;
            Ok::<_, AllotmentError>(summary)
        })
        .await
    }

    /// Sets the current period's budget; later periods inherit it.
    pub async fn set_recurring_budget(
        &self,
        manager_id: EmployeeId,
        period_type: PeriodType,
        amount: Coins,
    ) -> Result<AllotmentSummary, AllotmentError> {
        if amount.is_negative() {
            return Err(AllotmentError::NegativeBudget(amount));
        }
        with_retries(self.max_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let now = self.clock.now();
            let current = self.current_in(uow.as_mut(), manager_id, period_type, now).await?;
            let summary = Self::set_budget_in(uow.as_mut(), current, amount, now).await?;
            uow.commit().await?;
            Ok::<_, AllotmentError>(summary)
        })
        .await
    }

    /// Moves coins from the manager's personal balance into the current
    /// period's budget.
    pub async fn fund_from_balance(
        &self,
        manager_id: EmployeeId,
        period_type: PeriodType,
        amount: Coins,
    ) -> Result<FundingReceipt, AllotmentError> {
        if !amount.is_positive() {
            return Err(AllotmentError::NonPositiveAmount(amount));
        }
        with_retries(self.max_retries, move || async move {
            let mut uow = self.store.begin().await?;
            let now = self.clock.now();

            let account = uow.find_or_create_account(manager_id, now).await?;
            let input = NewTransaction::new(account.id, TransactionType::AllotmentDeposit, amount)
                .from_employee(manager_id)
                .with_description(format!("{period_type} allotment funding"));
            let transaction = LedgerService::create_and_post_in(uow.as_mut(), input, now).await?;

            let current = self.current_in(uow.as_mut(), manager_id, period_type, now).await?;
            let budget = current.allotment.amount + amount;
            let allotment = Self::set_budget_in(uow.as_mut(), current, budget, now).await?;
            uow.commit().await?;
            Ok::<_, AllotmentError>(FundingReceipt {
                transaction,
                allotment,
            })
        })
        .await
    }

    /// Applies a new budget to a locked period, refusing to drop below what
    /// has already been awarded.
    async fn set_budget_in(
        uow: &mut dyn UnitOfWork,
        current: AllotmentSummary,
        budget: Coins,
        now: DateTime<Utc>,
    ) -> Result<AllotmentSummary, AllotmentError> {
        // Awards are never negative, so this also refuses any negative result.
        if budget < current.used {
            return Err(AllotmentError::InsufficientBudget {
                used: current.used,
                budget,
            });
        }

        let mut allotment = current.allotment;
        uow.update_allotment_amount(allotment.id, budget, now).await?;
        allotment.amount = budget;
        allotment.updated_at = now;

        let summary = AllotmentSummary::new(allotment, current.used);
        Self::mirror_remaining(uow, summary.allotment.manager_id, summary.remaining, now).await?;

        info!(
            manager_id = %summary.allotment.manager_id,
            period_type = %summary.allotment.period_type,
            budget = %budget,
            used = %summary.used,
            "allotment budget updated"
        );
        Ok(summary)
    }
}
