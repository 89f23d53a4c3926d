//! Fixed-point coin amounts.
//!
//! CRITICAL: Never use floating-point for currency calculations.
//! `Coins` wraps `rust_decimal::Decimal` and is always carried at exactly
//! two decimal places, so sums over thousands of ledger rows stay exact.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits carried by every amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Errors raised when constructing a `Coins` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoinsError {
    /// The value has more fractional digits than the currency supports.
    #[error("Amount {0} has more than two decimal places")]
    ExcessPrecision(Decimal),
}

/// A coin amount with exactly two decimal places.
///
/// Negative values are representable so that signed deltas and
/// discrepancies can use the same type; ledger magnitudes are checked for
/// positivity where they are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Coins(Decimal);

impl Coins {
    /// Zero coins.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, CURRENCY_SCALE));

    /// The smallest representable amount (0.01).
    pub const MINOR_UNIT: Self = Self(Decimal::from_parts(1, 0, 0, false, CURRENCY_SCALE));

    /// Creates an amount, rejecting values finer than one minor unit.
    pub fn new(value: Decimal) -> Result<Self, CoinsError> {
        if value.normalize().scale() > CURRENCY_SCALE {
            return Err(CoinsError::ExcessPrecision(value));
        }
        let mut scaled = value;
        scaled.rescale(CURRENCY_SCALE);
        Ok(Self(scaled))
    }

    /// Creates an amount from a whole number of minor units.
    #[must_use]
    pub fn from_minor(minor_units: i64) -> Self {
        Self(Decimal::new(minor_units, CURRENCY_SCALE))
    }

    /// Returns the underlying decimal.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is strictly below zero.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// The larger of `self` and zero.
    #[must_use]
    pub fn clamp_non_negative(self) -> Self {
        if self.is_negative() { Self::ZERO } else { self }
    }
}

impl TryFrom<Decimal> for Coins {
    type Error = CoinsError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Coins> for Decimal {
    fn from(value: Coins) -> Self {
        value.0
    }
}

impl Add for Coins {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Coins {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Coins {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Coins {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Coins {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Coins {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Coins> for Coins {
    fn sum<I: Iterator<Item = &'a Coins>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
