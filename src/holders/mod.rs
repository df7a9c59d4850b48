//! Per-variable value caches
//!
//! One [`Holder`] exists per variable per simulation. It owns either the single
//! value of a permanent variable or a period-keyed [`PeriodStorage`]. Holders
//! know nothing about their simulation: population counts and the rest of the
//! computation context are passed in by the caller.
//!
//! - [`compute`]: cache-first resolution and the base-function policies
//! - [`set_input`]: spreading inputs given for broad periods

pub(crate) mod compute;
pub(crate) mod set_input;

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use crate::arrays::Array;
use crate::error::{EngineError, EngineResult};
use crate::periods::Period;
use crate::storage::{MemoryUsage, PeriodStorage};
use crate::variables::{Variable, VariableKind};

/// Index of a holder in its simulation's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(pub(crate) usize);

#[derive(Debug)]
enum Slot {
    Permanent(Option<Array>),
    Periods(Box<dyn PeriodStorage>),
}

/// Cached values of one variable
#[derive(Debug)]
pub struct Holder {
    variable: Arc<Variable>,
    slot: Slot,
}

impl Holder {
    /// Holder of `variable`; the storage is only used by non-permanent variables
    pub fn new(variable: Arc<Variable>, storage: Box<dyn PeriodStorage>) -> Self {
        let slot = match variable.kind() {
            VariableKind::Permanent => Slot::Permanent(None),
            _ => Slot::Periods(storage),
        };
        Self { variable, slot }
    }

    pub fn variable(&self) -> &Arc<Variable> {
        &self.variable
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self.slot, Slot::Permanent(_))
    }

    /// Array cached for exactly `period`; permanent holders ignore the period
    pub fn get_array(&self, period: &Period) -> EngineResult<Option<Array>> {
        match &self.slot {
            Slot::Permanent(value) => Ok(value.clone()),
            Slot::Periods(storage) => Ok(storage.get(period)?),
        }
    }

    /// Store `array` for `period` after checking it fits the population
    ///
    /// The array is cast to the variable's type when the types are compatible.
    /// Returns the array as stored.
    pub fn set_array(&mut self, period: &Period, array: Array, count: usize) -> EngineResult<Array> {
        let array = self.conform(array, count)?;
        match &mut self.slot {
            Slot::Permanent(value) => *value = Some(array.clone()),
            Slot::Periods(storage) => storage.put(array.clone(), *period)?,
        }
        Ok(array)
    }

    /// Check length and cast to the variable's type
    pub(crate) fn conform(&self, array: Array, count: usize) -> EngineResult<Array> {
        if array.len() != count {
            return Err(EngineError::PopulationMismatch {
                variable: self.variable.name().to_string(),
                expected: count,
                actual: array.len(),
            });
        }
        let actual = array.value_type();
        array
            .cast(self.variable.value_type())
            .ok_or_else(|| EngineError::ValueTypeMismatch {
                variable: self.variable.name().to_string(),
                expected: self.variable.value_type(),
                actual,
            })
    }

    /// Forget every value (`None`) or every value within `period`
    pub fn delete_arrays(&mut self, period: Option<&Period>) -> EngineResult<()> {
        match &mut self.slot {
            Slot::Permanent(value) => *value = None,
            Slot::Periods(storage) => storage.delete(period)?,
        }
        debug!(
            "Deleted arrays of {} for {}",
            self.variable.name(),
            period.map_or_else(|| "all periods".to_string(), |p| p.to_string())
        );
        Ok(())
    }

    /// Forget the value stored for exactly `period`
    pub fn remove_array(&mut self, period: &Period) -> EngineResult<()> {
        match &mut self.slot {
            Slot::Permanent(value) => {
                if period.is_eternal() {
                    *value = None;
                }
            }
            Slot::Periods(storage) => storage.remove(period)?,
        }
        Ok(())
    }

    pub fn known_periods(&self) -> BTreeSet<Period> {
        match &self.slot {
            Slot::Permanent(Some(_)) => BTreeSet::from([Period::eternity()]),
            Slot::Permanent(None) => BTreeSet::new(),
            Slot::Periods(storage) => storage.known_periods(),
        }
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        match &self.slot {
            Slot::Permanent(value) => MemoryUsage::from_sample(usize::from(value.is_some()), value.as_ref()),
            Slot::Periods(storage) => storage.memory_usage(),
        }
    }

    /// Most recent known period starting no later than `period`
    ///
    /// When `covering` is set the candidate must also last at least until the
    /// end of `period`.
    pub fn last_known_period(&self, period: &Period, covering: bool) -> Option<Period> {
        self.known_periods()
            .into_iter()
            .rev()
            .find(|known| known.start() <= period.start() && (!covering || known.stop() >= period.stop()))
    }

    /// Copy of this holder whose stored arrays go to `storage`
    pub(crate) fn try_clone_into(&self, mut storage: Box<dyn PeriodStorage>) -> EngineResult<Holder> {
        let slot = match &self.slot {
            Slot::Permanent(value) => Slot::Permanent(value.clone()),
            Slot::Periods(own) => {
                for (period, array) in own.entries()? {
                    storage.put(array, period)?;
                }
                Slot::Periods(storage)
            }
        };
        Ok(Holder {
            variable: Arc::clone(&self.variable),
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::ValueType;
    use crate::periods::DateUnit;
    use crate::storage::MemoryStorage;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn holder(value_type: ValueType, unit: DateUnit) -> Holder {
        let variable = Variable::builder("x", "person", value_type, unit).build().unwrap();
        Holder::new(Arc::new(variable), Box::new(MemoryStorage::new()))
    }

    #[test]
    fn test_set_and_get_exact() {
        let mut holder = holder(ValueType::Float, DateUnit::Month);
        holder.set_array(&p("2014-03"), Array::Float(vec![1.0, 2.0]), 2).unwrap();

        assert_eq!(holder.get_array(&p("2014-03")).unwrap(), Some(Array::Float(vec![1.0, 2.0])));
        assert_eq!(holder.get_array(&p("2014-04")).unwrap(), None);
        assert_eq!(holder.known_periods().len(), 1);
    }

    #[test]
    fn test_set_array_checks_length_and_casts() {
        let mut holder = holder(ValueType::Float, DateUnit::Month);

        let err = holder.set_array(&p("2014-03"), Array::Float(vec![1.0]), 2).unwrap_err();
        assert!(matches!(err, EngineError::PopulationMismatch { expected: 2, actual: 1, .. }));

        let stored = holder.set_array(&p("2014-03"), Array::Int(vec![3, 4]), 2).unwrap();
        assert_eq!(stored, Array::Float(vec![3.0, 4.0]));

        let dates = Array::Date(vec![chrono::NaiveDate::default(); 2]);
        assert!(matches!(
            holder.set_array(&p("2014-03"), dates, 2),
            Err(EngineError::ValueTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_permanent_ignores_period() {
        let mut holder = holder(ValueType::Int, DateUnit::Eternity);
        assert!(holder.is_permanent());
        holder.set_array(&Period::eternity(), Array::Int(vec![7]), 1).unwrap();

        assert_eq!(holder.get_array(&p("2030-01")).unwrap(), Some(Array::Int(vec![7])));
        assert_eq!(holder.known_periods().into_iter().next(), Some(Period::eternity()));

        holder.delete_arrays(None).unwrap();
        assert_eq!(holder.get_array(&Period::eternity()).unwrap(), None);
    }

    #[test]
    fn test_remove_array_is_exact() {
        let mut holder = holder(ValueType::Int, DateUnit::Month);
        holder.set_array(&p("2014-06"), Array::Int(vec![1]), 1).unwrap();
        holder.set_array(&p("2014"), Array::Int(vec![12]), 1).unwrap();

        holder.remove_array(&p("2014")).unwrap();
        assert_eq!(holder.known_periods().into_iter().collect::<Vec<_>>(), vec![p("2014-06")]);
        holder.remove_array(&p("2014")).unwrap();
    }

    #[test]
    fn test_last_known_period() {
        let mut holder = holder(ValueType::Int, DateUnit::Month);
        holder.set_array(&p("2014-01"), Array::Int(vec![1]), 1).unwrap();
        holder.set_array(&p("2014-06"), Array::Int(vec![2]), 1).unwrap();

        assert_eq!(holder.last_known_period(&p("2014-09"), false), Some(p("2014-06")));
        assert_eq!(holder.last_known_period(&p("2014-03"), false), Some(p("2014-01")));
        assert_eq!(holder.last_known_period(&p("2013-12"), false), None);
        assert_eq!(holder.last_known_period(&p("2014-09"), true), None);
    }

    #[test]
    fn test_clone_into_new_storage() {
        let mut holder = holder(ValueType::Int, DateUnit::Month);
        holder.set_array(&p("2014-01"), Array::Int(vec![1]), 1).unwrap();

        let mut copy = holder.try_clone_into(Box::new(MemoryStorage::new())).unwrap();
        copy.set_array(&p("2014-01"), Array::Int(vec![9]), 1).unwrap();

        assert_eq!(holder.get_array(&p("2014-01")).unwrap(), Some(Array::Int(vec![1])));
        assert_eq!(copy.get_array(&p("2014-01")).unwrap(), Some(Array::Int(vec![9])));
    }
}
