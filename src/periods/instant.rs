//! Calendar instants and date units

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Period, PeriodParseError};

/// Granularity of a period
///
/// Ordered from the finest to the coarsest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    Day,
    Month,
    Year,
    /// Period-invariant: covers all time
    Eternity,
}

impl DateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateUnit::Day => "day",
            DateUnit::Month => "month",
            DateUnit::Year => "year",
            DateUnit::Eternity => "eternity",
        }
    }

    /// Adverb used in diagnostics ("defined monthly")
    pub fn adverb(&self) -> &'static str {
        match self {
            DateUnit::Day => "daily",
            DateUnit::Month => "monthly",
            DateUnit::Year => "yearly",
            DateUnit::Eternity => "for eternity",
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateUnit {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(DateUnit::Day),
            "month" => Ok(DateUnit::Month),
            "year" => Ok(DateUnit::Year),
            "eternity" => Ok(DateUnit::Eternity),
            _ => Err(PeriodParseError::new(s, "unknown date unit")),
        }
    }
}

/// A single calendar day
///
/// Immutable and totally ordered. Offsets by months or years keep the
/// day-of-month when it exists in the target month and clamp to the month end
/// otherwise (2014-01-31 + 1 month = 2014-02-28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(NaiveDate);

impl Instant {
    /// Earliest representable instant, used as the start of eternity
    pub const MIN: Instant = Instant(NaiveDate::MIN);

    /// Latest representable instant, used as the stop of eternity
    pub const MAX: Instant = Instant(NaiveDate::MAX);

    /// Create an instant, validating the calendar date
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, PeriodParseError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Instant)
            .ok_or_else(|| {
                PeriodParseError::new(
                    &format!("{:04}-{:02}-{:02}", year, month, day),
                    "not a valid calendar date",
                )
            })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Instant(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Move `n` units forward (or backward when `n` is negative)
    ///
    /// Saturates at [`Instant::MIN`] / [`Instant::MAX`]. Offsetting by
    /// eternity returns the instant unchanged.
    pub fn offset(&self, n: i32, unit: DateUnit) -> Instant {
        let shifted = match unit {
            DateUnit::Day => self.0.checked_add_signed(Duration::days(i64::from(n))),
            DateUnit::Month => add_months(self.0, i64::from(n)),
            DateUnit::Year => add_months(self.0, i64::from(n) * 12),
            DateUnit::Eternity => Some(self.0),
        };

        match shifted {
            Some(date) => Instant(date),
            None if n < 0 => Instant::MIN,
            None => Instant::MAX,
        }
    }

    /// First day of the enclosing month or year
    pub fn first_of(&self, unit: DateUnit) -> Instant {
        let date = match unit {
            DateUnit::Month => self.0.with_day(1),
            DateUnit::Year => self.0.with_day(1).and_then(|d| d.with_month(1)),
            DateUnit::Day | DateUnit::Eternity => Some(self.0),
        };
        Instant(date.unwrap_or(self.0))
    }

    /// Last day of the enclosing month or year
    pub fn last_of(&self, unit: DateUnit) -> Instant {
        match unit {
            DateUnit::Month | DateUnit::Year => self
                .first_of(unit)
                .offset(1, unit)
                .offset(-1, DateUnit::Day),
            DateUnit::Day | DateUnit::Eternity => *self,
        }
    }

    /// Period of `size` units starting at this instant
    pub fn period(&self, unit: DateUnit, size: u32) -> Period {
        Period::new(unit, *self, size)
    }

    /// Whether this is the first day of a month
    pub fn is_month_start(&self) -> bool {
        self.day() == 1
    }

    /// Whether this is January 1st
    pub fn is_year_start(&self) -> bool {
        self.day() == 1 && self.month() == 1
    }
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = u32::try_from(months.unsigned_abs()).ok()?;
    if months >= 0 {
        date.checked_add_months(Months::new(magnitude))
    } else {
        date.checked_sub_months(Months::new(magnitude))
    }
}

impl From<NaiveDate> for Instant {
    fn from(date: NaiveDate) -> Self {
        Instant(date)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

impl FromStr for Instant {
    type Err = PeriodParseError;

    /// Accepts `YYYY`, `YYYY-MM` and `YYYY-MM-DD`; missing parts default to 1
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (instant, _) = parse_instant(s)?;
        Ok(instant)
    }
}

/// Parse an instant and report the natural unit of its written precision
pub(crate) fn parse_instant(input: &str) -> Result<(Instant, DateUnit), PeriodParseError> {
    let parts: Vec<&str> = input.split('-').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(PeriodParseError::new(input, "expected YYYY, YYYY-MM or YYYY-MM-DD"));
    }

    let mut numbers = [1u32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(PeriodParseError::new(input, "date components must be numeric"));
        }
        *slot = part
            .parse()
            .map_err(|_| PeriodParseError::new(input, "date component out of range"))?;
    }

    if parts[0].len() != 4 {
        return Err(PeriodParseError::new(input, "year must have four digits"));
    }

    let year = i32::try_from(numbers[0])
        .map_err(|_| PeriodParseError::new(input, "year out of range"))?;
    let instant = NaiveDate::from_ymd_opt(year, numbers[1], numbers[2])
        .map(Instant)
        .ok_or_else(|| PeriodParseError::new(input, "not a valid calendar date"))?;

    let unit = match parts.len() {
        1 => DateUnit::Year,
        2 => DateUnit::Month,
        _ => DateUnit::Day,
    };
    Ok((instant, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> Instant {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_partial_instants() {
        assert_eq!(at("2014"), Instant::new(2014, 1, 1).unwrap());
        assert_eq!(at("2014-03"), Instant::new(2014, 3, 1).unwrap());
        assert_eq!(at("2014-03-05").to_string(), "2014-03-05");

        assert!("2014-13".parse::<Instant>().is_err());
        assert!("2014-02-30".parse::<Instant>().is_err());
        assert!("14-02".parse::<Instant>().is_err());
        assert!("abcd".parse::<Instant>().is_err());
    }

    #[test]
    fn test_month_offset_clamps_to_month_end() {
        assert_eq!(at("2014-01-31").offset(1, DateUnit::Month), at("2014-02-28"));
        assert_eq!(at("2016-01-31").offset(1, DateUnit::Month), at("2016-02-29"));
        assert_eq!(at("2014-03-31").offset(-1, DateUnit::Month), at("2014-02-28"));
        assert_eq!(at("2014-03-15").offset(10, DateUnit::Month), at("2015-01-15"));
    }

    #[test]
    fn test_year_and_day_offsets() {
        assert_eq!(at("2016-02-29").offset(1, DateUnit::Year), at("2017-02-28"));
        assert_eq!(at("2014-01-01").offset(-1, DateUnit::Year), at("2013-01-01"));
        assert_eq!(at("2014-12-31").offset(1, DateUnit::Day), at("2015-01-01"));
        assert_eq!(at("2014-03-01").offset(-1, DateUnit::Day), at("2014-02-28"));
    }

    #[test]
    fn test_offset_saturates() {
        assert_eq!(Instant::MAX.offset(1, DateUnit::Day), Instant::MAX);
        assert_eq!(Instant::MIN.offset(-1, DateUnit::Year), Instant::MIN);
    }

    #[test]
    fn test_first_and_last_of() {
        let instant = at("2014-03-17");
        assert_eq!(instant.first_of(DateUnit::Month), at("2014-03-01"));
        assert_eq!(instant.first_of(DateUnit::Year), at("2014-01-01"));
        assert_eq!(instant.last_of(DateUnit::Month), at("2014-03-31"));
        assert_eq!(instant.last_of(DateUnit::Year), at("2014-12-31"));
    }

    #[test]
    fn test_unit_ordering() {
        assert!(DateUnit::Day < DateUnit::Month);
        assert!(DateUnit::Month < DateUnit::Year);
        assert!(DateUnit::Year < DateUnit::Eternity);
        assert_eq!("MONTH".parse::<DateUnit>().unwrap(), DateUnit::Month);
    }
}
