//! Calendar algebra used to key every cached value
//!
//! - [`Instant`]: a single calendar day
//! - [`DateUnit`]: day, month, year or eternity
//! - [`Period`]: a unit, a start instant and a size, with containment,
//!   intersection, sub-period iteration and a canonical string form
//!
//! String grammar accepted by [`Period::from_str`](std::str::FromStr):
//!
//! | Input              | Meaning                                  |
//! |--------------------|------------------------------------------|
//! | `2014`             | year 2014                                |
//! | `2014:3`           | 3 years starting 2014-01-01              |
//! | `2014-03`          | March 2014                               |
//! | `2014-03:3`        | 3 months starting 2014-03-01             |
//! | `2014-03-05`       | a single day                             |
//! | `2014-03-05:10`    | 10 days                                  |
//! | `year:2014-03`     | a year starting 2014-03-01               |
//! | `month:2014-03-05` | a month starting 2014-03-05              |
//! | `eternity`         | the period of period-invariant variables |

mod instant;
mod period;

pub use instant::{DateUnit, Instant};
pub use period::{Period, SubPeriods};

use thiserror::Error;

/// Malformed period or instant string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid period '{input}': {reason}")]
pub struct PeriodParseError {
    pub input: String,
    pub reason: String,
}

impl PeriodParseError {
    pub(crate) fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a period string, e.g. `period("2014-03")`
pub fn period(input: &str) -> Result<Period, PeriodParseError> {
    input.parse()
}

/// Parse an instant string (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`)
pub fn instant(input: &str) -> Result<Instant, PeriodParseError> {
    input.parse()
}
