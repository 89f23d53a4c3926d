//! Allotment domain types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kudos_shared::types::{AllotmentId, Coins, EmployeeId};

use crate::allotment::period::Period;

/// Length of a recurring allotment period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Calendar month.
    Monthly,
    /// Calendar quarter.
    Quarterly,
}

impl PeriodType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        }
    }

    /// Parses a period type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manager's award budget for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAllotment {
    /// Allotment ID.
    pub id: AllotmentId,
    /// Manager who may award from this budget.
    pub manager_id: EmployeeId,
    /// Monthly or quarterly.
    pub period_type: PeriodType,
    /// Budget for the period.
    pub amount: Coins,
    /// Inclusive period start.
    pub period_start: DateTime<Utc>,
    /// Exclusive period end.
    pub period_end: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ManagerAllotment {
    /// Builds a new row for `period`.
    #[must_use]
    pub fn open(
        manager_id: EmployeeId,
        period_type: PeriodType,
        period: Period,
        amount: Coins,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AllotmentId::new(),
            manager_id,
            period_type,
            amount,
            period_start: period.start,
            period_end: period.end,
            created_at: at,
            updated_at: at,
        }
    }
}

/// An allotment together with its derived usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentSummary {
    /// The period row.
    pub allotment: ManagerAllotment,
    /// Posted manager awards inside the period.
    pub used: Coins,
    /// `amount - used`, never below zero.
    pub remaining: Coins,
}

impl AllotmentSummary {
    /// Derives `remaining` from the row and its usage.
    #[must_use]
    pub fn new(allotment: ManagerAllotment, used: Coins) -> Self {
        let remaining = (allotment.amount - used).clamp_non_negative();
        Self {
            allotment,
            used,
            remaining,
        }
    }
}
