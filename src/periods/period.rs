//! Periods: a unit, a start instant and a size

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::instant::parse_instant;
use super::{DateUnit, Instant, PeriodParseError};

/// A calendar span over which a cached value is constant
///
/// `size` counts units from `start`; it is always at least 1. The eternity
/// period uses [`Instant::MIN`] as a sentinel start and contains every other
/// period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Period {
    unit: DateUnit,
    start: Instant,
    size: u32,
}

impl Period {
    /// Create a period; a zero size is raised to 1
    pub fn new(unit: DateUnit, start: Instant, size: u32) -> Self {
        if unit == DateUnit::Eternity {
            return Self::eternity();
        }
        Self {
            unit,
            start,
            size: size.max(1),
        }
    }

    /// The single period of period-invariant variables
    pub fn eternity() -> Self {
        Self {
            unit: DateUnit::Eternity,
            start: Instant::MIN,
            size: 1,
        }
    }

    /// Calendar year
    pub fn year(year: i32) -> Result<Self, PeriodParseError> {
        Ok(Instant::new(year, 1, 1)?.period(DateUnit::Year, 1))
    }

    /// Calendar month
    pub fn month(year: i32, month: u32) -> Result<Self, PeriodParseError> {
        Ok(Instant::new(year, month, 1)?.period(DateUnit::Month, 1))
    }

    pub fn unit(&self) -> DateUnit {
        self.unit
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_eternal(&self) -> bool {
        self.unit == DateUnit::Eternity
    }

    /// Last day included in the period
    pub fn stop(&self) -> Instant {
        if self.is_eternal() {
            return Instant::MAX;
        }
        let size = i32::try_from(self.size).unwrap_or(i32::MAX);
        self.start.offset(size, self.unit).offset(-1, DateUnit::Day)
    }

    /// Whether `other`'s days are all within this period
    pub fn contains(&self, other: &Period) -> bool {
        if self.is_eternal() {
            return true;
        }
        if other.is_eternal() {
            return false;
        }
        self.start <= other.start && other.stop() <= self.stop()
    }

    /// Clip the period to `[lower, upper]` (`None` bounds are open)
    ///
    /// Returns `None` when the period and the window are disjoint. The result
    /// is expressed in whole years when it tiles into years, else in whole
    /// months, else in days.
    pub fn intersection(&self, lower: Option<Instant>, upper: Option<Instant>) -> Option<Period> {
        if self.is_eternal() {
            return Some(*self);
        }

        let stop = self.stop();
        let start = lower.map_or(self.start, |lower| lower.max(self.start));
        let end = upper.map_or(stop, |upper| upper.min(stop));
        if start > end {
            return None;
        }
        if start == self.start && end == stop {
            return Some(*self);
        }
        Some(Self::spanning(start, end))
    }

    /// Smallest-unit-count period covering exactly `[start, end]`
    fn spanning(start: Instant, end: Instant) -> Period {
        let after = end.offset(1, DateUnit::Day);
        if start.is_month_start() && after.is_month_start() {
            let months = (after.year() - start.year()) * 12 + after.month() as i32
                - start.month() as i32;
            let months = u32::try_from(months).unwrap_or(1);
            if start.month() == after.month() && months % 12 == 0 {
                return Period::new(DateUnit::Year, start, months / 12);
            }
            return Period::new(DateUnit::Month, start, months);
        }
        let days = (end.date() - start.date()).num_days() + 1;
        Period::new(DateUnit::Day, start, u32::try_from(days).unwrap_or(1))
    }

    /// Shift the period by `n` of its own units
    pub fn offset(&self, n: i32) -> Period {
        self.offset_by(n, self.unit)
    }

    /// Shift the start by `n` units, keeping unit and size
    pub fn offset_by(&self, n: i32, unit: DateUnit) -> Period {
        if self.is_eternal() {
            return *self;
        }
        Period::new(self.unit, self.start.offset(n, unit), self.size)
    }

    /// Size-1 periods of `unit` tiling this period, in chronological order
    ///
    /// The iterator is lazy and can be cloned to restart. Units coarser than
    /// the period's own unit yield the enclosing sub-periods starting at
    /// `start`; eternity yields nothing.
    pub fn sub_periods(&self, unit: DateUnit) -> SubPeriods {
        SubPeriods {
            next: self.start,
            stop: self.stop(),
            unit,
            done: self.is_eternal() || unit == DateUnit::Eternity,
        }
    }

    /// Number of `unit` sub-periods when they tile the period exactly
    pub fn size_in(&self, unit: DateUnit) -> Option<u32> {
        match (self.unit, unit) {
            (a, b) if a == b => Some(self.size),
            (DateUnit::Year, DateUnit::Month) => self.size.checked_mul(12),
            (DateUnit::Year | DateUnit::Month, DateUnit::Day) => {
                let days = (self.stop().date() - self.start.date()).num_days() + 1;
                u32::try_from(days).ok()
            }
            _ => None,
        }
    }

    /// The first month of the period
    pub fn first_month(&self) -> Period {
        self.start.first_of(DateUnit::Month).period(DateUnit::Month, 1)
    }

    /// The calendar year containing the period's start
    pub fn this_year(&self) -> Period {
        self.start.first_of(DateUnit::Year).period(DateUnit::Year, 1)
    }

    /// The calendar year before the one containing the period's start
    pub fn last_year(&self) -> Period {
        self.this_year().offset(-1)
    }

    /// The month before the period's first month
    pub fn last_month(&self) -> Period {
        self.first_month().offset(-1)
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Period {
    /// Chronological by start, then by stop, then by unit
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.stop().cmp(&other.stop()))
            .then_with(|| self.unit.cmp(&other.unit))
            .then_with(|| self.size.cmp(&other.size))
    }
}

/// Lazy iterator over the unit sub-periods of a period
#[derive(Debug, Clone)]
pub struct SubPeriods {
    next: Instant,
    stop: Instant,
    unit: DateUnit,
    done: bool,
}

impl Iterator for SubPeriods {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        if self.done || self.next > self.stop {
            return None;
        }
        let period = self.next.period(self.unit, 1);
        let following = self.next.offset(1, self.unit);
        if following <= self.next {
            self.done = true;
        }
        self.next = following;
        Some(period)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start;
        match self.unit {
            DateUnit::Eternity => return f.write_str("eternity"),
            DateUnit::Year if start.is_year_start() => write!(f, "{:04}", start.year())?,
            DateUnit::Year if start.is_month_start() => {
                write!(f, "year:{:04}-{:02}", start.year(), start.month())?
            }
            DateUnit::Year => write!(f, "year:{}", start)?,
            DateUnit::Month if start.is_month_start() => {
                write!(f, "{:04}-{:02}", start.year(), start.month())?
            }
            DateUnit::Month => write!(f, "month:{}", start)?,
            DateUnit::Day => write!(f, "{}", start)?,
        }
        if self.size > 1 {
            write!(f, ":{}", self.size)?;
        }
        Ok(())
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        if text.eq_ignore_ascii_case("eternity") {
            return Ok(Period::eternity());
        }

        let (prefix, rest) = match text.split_once(':') {
            Some((head, tail)) if head.chars().all(|c| c.is_ascii_alphabetic()) => {
                let unit: DateUnit = head
                    .parse()
                    .map_err(|_| PeriodParseError::new(input, "unknown unit prefix"))?;
                (Some(unit), tail)
            }
            _ => (None, text),
        };

        let (base, size) = match rest.split_once(':') {
            Some((base, size)) => {
                let size: u32 = size
                    .parse()
                    .map_err(|_| PeriodParseError::new(input, "size must be a positive integer"))?;
                if size == 0 {
                    return Err(PeriodParseError::new(input, "size must be at least 1"));
                }
                (base, size)
            }
            None => (rest, 1),
        };

        let (start, natural) =
            parse_instant(base).map_err(|e| PeriodParseError::new(input, e.reason))?;

        let unit = match prefix {
            None => natural,
            Some(DateUnit::Eternity) => {
                return Err(PeriodParseError::new(input, "eternity takes no start or size"))
            }
            Some(unit) if unit < natural => {
                return Err(PeriodParseError::new(
                    input,
                    format!("a {} period cannot start on a {} boundary", unit, natural),
                ))
            }
            Some(unit) => unit,
        };

        Ok(Period::new(unit, start, size))
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for Period {
    type Error = PeriodParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn at(s: &str) -> Instant {
        s.parse().unwrap()
    }

    #[test]
    fn test_canonical_round_trip() {
        let canonical = [
            "2014",
            "2014:3",
            "2014-03",
            "2014-03:3",
            "2014-03-05",
            "2014-03-05:10",
            "year:2014-03",
            "year:2014-03:2",
            "year:2014-03-05",
            "month:2014-03-05",
            "month:2014-03-05:4",
            "eternity",
        ];
        for s in canonical {
            assert_eq!(p(s).to_string(), s, "round trip failed for {}", s);
        }
    }

    #[test]
    fn test_prefixed_forms_normalize() {
        assert_eq!(p("year:2014").to_string(), "2014");
        assert_eq!(p("month:2014-03").to_string(), "2014-03");
        assert_eq!(p("month:2014-03:12").to_string(), "2014-03:12");
        assert_eq!(p("year:2014-01:2").to_string(), "2014:2");
        assert_eq!(p(" 2014 ").to_string(), "2014");
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "2014:0", "2014:x", "day:2014", "month:2014", "decade:2014", "2014-03-05-01", "eternity:2014", "20144"] {
            assert!(bad.parse::<Period>().is_err(), "{} should not parse", bad);
        }
        let err = "2014-13".parse::<Period>().unwrap_err();
        assert_eq!(err.input, "2014-13");
    }

    #[test]
    fn test_stop() {
        assert_eq!(p("2014").stop(), at("2014-12-31"));
        assert_eq!(p("2014-02").stop(), at("2014-02-28"));
        assert_eq!(p("2014-11:3").stop(), at("2015-01-31"));
        assert_eq!(p("2014-03-05:10").stop(), at("2014-03-14"));
        assert_eq!(p("year:2014-03").stop(), at("2015-02-28"));
        assert_eq!(Period::eternity().stop(), Instant::MAX);
    }

    #[test]
    fn test_contains() {
        assert!(p("2014").contains(&p("2014-03")));
        assert!(p("2014").contains(&p("2014")));
        assert!(p("2014").contains(&p("2014-12-31")));
        assert!(!p("2014").contains(&p("2014-12:2")));
        assert!(!p("2014-03").contains(&p("2014")));
        assert!(Period::eternity().contains(&p("2014")));
        assert!(!p("2014").contains(&Period::eternity()));
    }

    #[test]
    fn test_intersection() {
        let year = p("2014");
        assert_eq!(year.intersection(None, None), Some(year));
        assert_eq!(year.intersection(Some(at("2015-01-01")), None), None);
        assert_eq!(year.intersection(None, Some(at("2013-12-31"))), None);
        assert_eq!(
            year.intersection(Some(at("2014-04-01")), None),
            Some(p("2014-04:9"))
        );
        assert_eq!(
            year.intersection(None, Some(at("2014-06-15"))),
            Some(p("2014-01-01:166"))
        );
        assert_eq!(
            p("2013:3").intersection(Some(at("2014-01-01")), Some(at("2014-12-31"))),
            Some(p("2014"))
        );
        assert_eq!(
            p("2013:3").intersection(Some(at("2014-03-01")), Some(at("2015-02-28"))),
            Some(p("year:2014-03"))
        );
    }

    #[test]
    fn test_sub_periods() {
        let months: Vec<Period> = p("2014").sub_periods(DateUnit::Month).collect();
        assert_eq!(months.len(), 12);
        assert_eq!(months[0], p("2014-01"));
        assert_eq!(months[11], p("2014-12"));

        let years: Vec<Period> = p("2014:3").sub_periods(DateUnit::Year).collect();
        assert_eq!(years, vec![p("2014"), p("2015"), p("2016")]);

        assert_eq!(p("2014-02").sub_periods(DateUnit::Day).count(), 28);
        assert_eq!(Period::eternity().sub_periods(DateUnit::Month).count(), 0);
    }

    #[test]
    fn test_sub_periods_restart() {
        let iter = p("2014-11:3").sub_periods(DateUnit::Month);
        let first: Vec<Period> = iter.clone().collect();
        let second: Vec<Period> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first[2], p("2015-01"));
    }

    #[test]
    fn test_size_in() {
        assert_eq!(p("2014:2").size_in(DateUnit::Month), Some(24));
        assert_eq!(p("2016").size_in(DateUnit::Day), Some(366));
        assert_eq!(p("2014-03").size_in(DateUnit::Year), None);

        let huge = Period::new(DateUnit::Year, p("2014").start(), u32::MAX);
        assert_eq!(huge.size_in(DateUnit::Month), None);
    }

    #[test]
    fn test_navigation() {
        assert_eq!(p("2014-03").this_year(), p("2014"));
        assert_eq!(p("2014-03").last_year(), p("2013"));
        assert_eq!(p("2014").first_month(), p("2014-01"));
        assert_eq!(p("2014-01").last_month(), p("2013-12"));
        assert_eq!(p("2014-03:3").offset(1), p("2014-04:3"));
    }

    #[test]
    fn test_ordering_is_chronological() {
        let mut periods = vec![p("2015"), p("2014-03"), p("2014"), p("2014-01")];
        periods.sort();
        assert_eq!(periods, vec![p("2014-01"), p("2014"), p("2014-03"), p("2015")]);
    }

    #[test]
    fn test_serde_uses_string_form() {
        let json = serde_json::to_string(&p("2014-03:3")).unwrap();
        assert_eq!(json, "\"2014-03:3\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p("2014-03:3"));
    }
}
