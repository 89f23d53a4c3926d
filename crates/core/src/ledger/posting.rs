//! Posting rules: the pure decision half of the ledger.
//!
//! `PostingRules` never touches storage. The service loads rows inside a
//! unit of work, asks for a [`PostingPlan`], then applies it.

use rust_decimal::Decimal;

use kudos_shared::types::{AccountId, Coins, TransactionId};

use super::classification::Direction;
use super::error::LedgerError;
use super::types::{Account, LedgerTransaction, NewTransaction, TransactionStatus, TransactionType};

/// What posting a transaction will do to its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingPlan {
    /// Transaction being posted.
    pub transaction_id: TransactionId,
    /// Account to mutate.
    pub account_id: AccountId,
    /// Credit or debit.
    pub direction: Direction,
    /// Signed balance change.
    pub delta: Coins,
    /// Balance after the change; never negative.
    pub new_balance: Coins,
}

/// Stateless ledger rules.
pub struct PostingRules;

impl PostingRules {
    /// Parses a raw decimal into a positive amount.
    pub fn parse_amount(value: Decimal) -> Result<Coins, LedgerError> {
        let amount = Coins::new(value)?;
        Self::validate_amount(amount)?;
        Ok(amount)
    }

    /// Parses a raw type name.
    pub fn parse_type(value: &str) -> Result<TransactionType, LedgerError> {
        value.parse()
    }

    /// Amounts are strictly positive magnitudes.
    pub fn validate_amount(amount: Coins) -> Result<(), LedgerError> {
        if amount.is_positive() {
            Ok(())
        } else {
            Err(LedgerError::NonPositiveAmount(amount))
        }
    }

    /// Validates a creation request.
    pub fn validate_new(input: &NewTransaction) -> Result<(), LedgerError> {
        Self::validate_amount(input.amount)
    }

    /// Fails unless the transaction is still pending.
    pub fn ensure_pending(tx: &LedgerTransaction) -> Result<(), LedgerError> {
        match tx.status {
            TransactionStatus::Pending => Ok(()),
            status => Err(LedgerError::NotPending {
                transaction_id: tx.id,
                status,
            }),
        }
    }

    /// Decides the balance effect of posting `tx` against `account`.
    ///
    /// A debit that would take the balance below zero is refused with
    /// `InsufficientFunds`; the transaction stays pending.
    pub fn plan(tx: &LedgerTransaction, account: &Account) -> Result<PostingPlan, LedgerError> {
        Self::ensure_pending(tx)?;
        if tx.account_id != account.id {
            return Err(LedgerError::AccountNotFound(tx.account_id));
        }

        let direction = tx.direction();
        let delta = direction.apply(tx.amount);
        let new_balance = account.balance + delta;

        if direction == Direction::Debit && new_balance.is_negative() {
            return Err(LedgerError::InsufficientFunds {
                account_id: account.id,
                requested: tx.amount,
                available: account.balance,
            });
        }

        Ok(PostingPlan {
            transaction_id: tx.id,
            account_id: account.id,
            direction,
            delta,
            new_balance,
        })
    }

    /// Picks the adjustment type from the sign of `signed_amount`.
    pub fn adjustment_for(signed_amount: Coins) -> Result<(TransactionType, Coins), LedgerError> {
        if signed_amount.is_zero() {
            Err(LedgerError::ZeroAdjustment)
        } else if signed_amount.is_negative() {
            Ok((TransactionType::AdjustmentDebit, signed_amount.abs()))
        } else {
            Ok((TransactionType::AdjustmentCredit, signed_amount))
        }
    }
}
