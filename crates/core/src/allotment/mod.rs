//! Manager allotments.
//!
//! Each manager has a recurring award budget per calendar month or quarter.
//! Awards draw it down; administrators deposit into it or reset it.

pub mod error;
pub mod period;
pub mod service;
pub mod types;


pub use error::AllotmentError;
pub use period::Period;
pub use service::{AllotmentService, AwardRequest, FundingReceipt};
pub use types::{AllotmentSummary, ManagerAllotment, PeriodType};
