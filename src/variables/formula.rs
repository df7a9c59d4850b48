//! Dated formula registry
//!
//! A variable may change shape over time as legislation changes. Each shape is
//! a plain function valid over an inclusive date window; windows never overlap
//! but may leave gaps, in which case the variable takes its default value.

use std::fmt;

use crate::arrays::Array;
use crate::error::EngineResult;
use crate::parameters::Legislation;
use crate::periods::{DateUnit, Instant, Period};
use crate::simulation::PopulationView;

/// Calling contract of every formula
///
/// The view gives access to other variables of the same simulation; the
/// result must have one cell per member of the view's population.
pub type FormulaFn = fn(&mut PopulationView<'_>, &Period, &Legislation) -> EngineResult<Array>;

/// One formula and the inclusive window `[start, stop]` where it applies
///
/// `None` bounds are open.
#[derive(Clone, Copy)]
pub struct DatedFormula {
    pub start: Option<Instant>,
    pub stop: Option<Instant>,
    pub function: FormulaFn,
}

impl DatedFormula {
    pub fn covers(&self, instant: Instant) -> bool {
        self.start.map_or(true, |start| start <= instant) && self.stop.map_or(true, |stop| instant <= stop)
    }

    fn overlaps(&self, other: &DatedFormula) -> bool {
        let starts_before_other_ends = match (self.start, other.stop) {
            (Some(start), Some(stop)) => start <= stop,
            _ => true,
        };
        let ends_after_other_starts = match (self.stop, other.start) {
            (Some(stop), Some(start)) => start <= stop,
            _ => true,
        };
        starts_before_other_ends && ends_after_other_starts
    }

    /// Part of `period` this formula covers
    pub fn coverage(&self, period: &Period) -> Option<Period> {
        period.intersection(self.start, self.stop)
    }
}

impl fmt::Debug for DatedFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<Instant>| b.map_or_else(|| "..".to_string(), |i| i.to_string());
        write!(f, "DatedFormula[{} .. {}]", bound(self.start), bound(self.stop))
    }
}

/// Formulas of one variable, sorted by start and pairwise disjoint
#[derive(Debug, Clone, Default)]
pub struct DatedFormulas {
    entries: Vec<DatedFormula>,
}

impl DatedFormulas {
    /// Validate and sort a set of entries, each tagged with whether it is
    /// open-ended
    ///
    /// Open-ended entries end the day before the next entry starts. Returns
    /// the reason when two windows overlap.
    pub(crate) fn from_entries(mut tagged: Vec<(DatedFormula, bool)>) -> Result<Self, String> {
        tagged.sort_by_key(|(formula, _)| formula.start.unwrap_or(Instant::MIN));

        for i in 1..tagged.len() {
            let next_start = tagged[i].0.start;
            let (previous, open) = &mut tagged[i - 1];
            if *open && previous.stop.is_none() {
                if let Some(next_start) = next_start {
                    previous.stop = Some(next_start.offset(-1, DateUnit::Day));
                }
            }
        }

        let entries: Vec<DatedFormula> = tagged.into_iter().map(|(formula, _)| formula).collect();
        for pair in entries.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(format!("formulas {:?} and {:?} overlap", pair[0], pair[1]));
            }
        }
        if let Some(empty) = entries
            .iter()
            .find(|f| matches!((f.start, f.stop), (Some(start), Some(stop)) if stop < start))
        {
            return Err(format!("formula {:?} ends before it starts", empty));
        }
        Ok(Self { entries })
    }

    /// Formula whose window contains `instant`
    pub fn find(&self, instant: Instant) -> Option<&DatedFormula> {
        self.entries.iter().find(|f| f.covers(instant))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatedFormula> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> Instant {
        s.parse().unwrap()
    }

    fn zero(view: &mut PopulationView<'_>, _: &Period, _: &Legislation) -> EngineResult<Array> {
        Ok(Array::Float(vec![0.0; view.count()]))
    }

    fn entry(start: Option<&str>, stop: Option<&str>) -> DatedFormula {
        DatedFormula {
            start: start.map(at),
            stop: stop.map(at),
            function: zero,
        }
    }

    #[test]
    fn test_open_ended_entries_are_chained() {
        let formulas =
            DatedFormulas::from_entries(vec![(entry(Some("2015-01-01"), None), true), (entry(None, None), true)])
                .unwrap();

        assert_eq!(formulas.len(), 2);
        let first = formulas.iter().next().unwrap();
        assert_eq!(first.start, None);
        assert_eq!(first.stop, Some(at("2014-12-31")));

        assert_eq!(formulas.find(at("2014-12-31")).unwrap().stop, Some(at("2014-12-31")));
        assert_eq!(formulas.find(at("2015-01-01")).unwrap().start, Some(at("2015-01-01")));
    }

    #[test]
    fn test_gap_finds_nothing() {
        let formulas = DatedFormulas::from_entries(vec![
            (entry(Some("2010-01-01"), Some("2012-12-31")), false),
            (entry(Some("2014-01-01"), None), true),
        ])
        .unwrap();

        assert!(formulas.find(at("2009-12-31")).is_none());
        assert!(formulas.find(at("2013-06-01")).is_none());
        assert!(formulas.find(at("2030-01-01")).is_some());
    }

    #[test]
    fn test_overlap_rejected() {
        let err = DatedFormulas::from_entries(vec![
            (entry(Some("2010-01-01"), Some("2014-12-31")), false),
            (entry(Some("2014-01-01"), Some("2016-12-31")), false),
        ])
        .unwrap_err();
        assert!(err.contains("overlap"));

        assert!(DatedFormulas::from_entries(vec![(entry(None, None), false), (entry(None, None), false)]).is_err());
    }

    #[test]
    fn test_coverage_of_partial_period() {
        let formula = entry(Some("2015-03-01"), None);
        let year: Period = "2015".parse().unwrap();
        assert_eq!(formula.coverage(&year).unwrap().to_string(), "2015-03:10");
        assert!(formula.coverage(&"2014".parse().unwrap()).is_none());
    }
}
