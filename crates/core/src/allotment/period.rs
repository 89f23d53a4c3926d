//! Calendar period boundaries for allotments.
//!
//! All periods are UTC and half-open: `[start, end)`.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::allotment::types::PeriodType;

/// A concrete allotment period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    /// Inclusive start (midnight UTC on the first day).
    pub start: DateTime<Utc>,
    /// Exclusive end (start of the next period).
    pub end: DateTime<Utc>,
}

impl Period {
    /// The period of `period_type` containing `at`.
    ///
    /// Returns `None` only at the far edge of chrono's representable range.
    #[must_use]
    pub fn containing(period_type: PeriodType, at: DateTime<Utc>) -> Option<Self> {
        let year = at.year();
        let first_month = match period_type {
            PeriodType::Monthly => at.month(),
            PeriodType::Quarterly => (at.month0() / 3) * 3 + 1,
        };
        let months = match period_type {
            PeriodType::Monthly => 1,
            PeriodType::Quarterly => 3,
        };

        let start = NaiveDate::from_ymd_opt(year, first_month, 1)?;
        let (end_year, end_month) = if first_month + months > 12 {
            (year + 1, first_month + months - 12)
        } else {
            (year, first_month + months)
        };
        let end = NaiveDate::from_ymd_opt(end_year, end_month, 1)?;

        Some(Self {
            start: midnight(start)?,
            end: midnight(end)?,
        })
    }

    /// Returns true if `at` falls inside the period.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}
