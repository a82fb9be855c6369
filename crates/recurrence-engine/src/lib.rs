//! # recurrence-engine
//!
//! RFC 5545 recurrence rules: validation, expansion, queries, rule sets and
//! the RRULE text format.
//!
//! Rules expand lazily, one period at a time, so rules without COUNT or
//! UNTIL can be queried with [`Rule::between`], [`Rule::after`] and
//! [`Rule::before`] without materializing anything past the answer.
//!
//! ```
//! use recurrence_engine::Rule;
//!
//! let rule: Rule = "DTSTART:19961105T090000Z\n\
//!     RRULE:FREQ=YEARLY;INTERVAL=4;COUNT=3;BYMONTH=11;BYMONTHDAY=2,3,4,5,6,7,8;BYDAY=TU"
//!     .parse()
//!     .unwrap();
//! let dates: Vec<String> = rule
//!     .all()
//!     .unwrap()
//!     .iter()
//!     .map(|dt| dt.format("%Y-%m-%d").to_string())
//!     .collect();
//! assert_eq!(dates, ["1996-11-05", "2000-11-07", "2004-11-02"]);
//! ```
//!
//! ## Modules
//!
//! - [`options`] — typed options, validation and RFC defaults
//! - [`calendar`] — leap years, month lengths, Easter
//! - [`dst`] — resolving wall-clock times that fall into DST gaps
//! - [`iter`] — the expansion engine
//! - [`rule`] — the immutable [`Rule`]
//! - [`set`] — [`RuleSet`]: RRULE, RDATE, EXRULE, EXDATE
//! - [`parser`] / [`serializer`] — the RRULE text format
//! - [`error`] — Error types

pub mod calendar;
pub mod dst;
pub mod error;
pub mod iter;
pub mod options;
pub mod parser;
mod query;
pub mod rule;
pub mod serializer;
pub mod set;

pub use dst::DstPolicy;
pub use error::{RecurError, Result};
pub use iter::RuleIter;
pub use options::{Frequency, NWeekday, Options};
pub use parser::{
    parse_dates, parse_dtstart, parse_options, parse_rule, parse_set, parse_set_lines,
    resolve_timezone,
};
pub use rule::Rule;
pub use set::{RuleSet, SetIter};

pub use chrono::Weekday;
pub use chrono_tz::Tz;
