//! Inputs given for periods other than the definition period
//!
//! A single-unit input is stored as is. Broader inputs are spread over the
//! definition-period sub-periods according to the variable's
//! [`SetInputPolicy`]; sub-periods that already hold a value keep it.

use std::sync::Arc;

use log::{debug, warn};

use super::Holder;
use crate::arrays::{Array, ValueType};
use crate::error::{EngineError, EngineResult};
use crate::periods::Period;
use crate::variables::{SetInputPolicy, VariableKind};

/// Store an input for `period` in `holder`
pub(crate) fn set_input(holder: &mut Holder, period: &Period, array: Array, count: usize) -> EngineResult<()> {
    let variable = Arc::clone(holder.variable());
    if variable.is_neutralized() {
        warn!(
            "Ignoring input for {}@{}: the variable is neutralized",
            variable.name(),
            period
        );
        return Ok(());
    }

    let native = variable.definition_period();
    match variable.kind() {
        VariableKind::Permanent => {
            holder.set_array(&Period::eternity(), array, count)?;
            return Ok(());
        }
        VariableKind::PeriodSizeIndependent => {
            holder.set_array(period, array, count)?;
            return Ok(());
        }
        VariableKind::Ordinary => {}
    }

    if period.unit() == native && period.size() == 1 {
        holder.set_array(period, array, count)?;
        return Ok(());
    }

    let mismatch = || EngineError::PeriodMismatch {
        variable: variable.name().to_string(),
        period: *period,
        definition_period: native,
    };
    if period.size_in(native).is_none() {
        return Err(mismatch());
    }

    match variable.set_input() {
        None => Err(mismatch()),
        Some(SetInputPolicy::DispatchByPeriod) => dispatch_by_period(holder, period, array, count),
        Some(SetInputPolicy::DivideByPeriod) => divide_by_period(holder, period, array, count),
    }
}

/// Copy the value to every sub-period without a value
fn dispatch_by_period(holder: &mut Holder, period: &Period, array: Array, count: usize) -> EngineResult<()> {
    let array = holder.conform(array, count)?;
    let native = holder.variable().definition_period();
    let mut filled = 0;
    for sub in period.sub_periods(native) {
        if holder.get_array(&sub)?.is_none() {
            holder.set_array(&sub, array.clone(), count)?;
            filled += 1;
        }
    }
    debug!("Dispatched {}@{} to {} sub-periods", holder.variable().name(), period, filled);
    Ok(())
}

/// Divide what the known sub-periods leave of the total over the unknown ones
fn divide_by_period(holder: &mut Holder, period: &Period, array: Array, count: usize) -> EngineResult<()> {
    let total = holder.conform(array, count)?;
    let variable = Arc::clone(holder.variable());
    let type_mismatch = |actual: ValueType| EngineError::ValueTypeMismatch {
        variable: variable.name().to_string(),
        expected: variable.value_type(),
        actual,
    };

    let mut remaining = total;
    let mut unknown = Vec::new();
    for sub in period.sub_periods(variable.definition_period()) {
        match holder.get_array(&sub)? {
            Some(known) => {
                remaining = remaining
                    .checked_sub(&known)
                    .ok_or_else(|| type_mismatch(known.value_type()))?;
            }
            None => unknown.push(sub),
        }
    }

    if unknown.is_empty() {
        if remaining.is_all_zero() {
            return Ok(());
        }
        return Err(EngineError::InconsistentInput {
            variable: variable.name().to_string(),
            period: *period,
        });
    }

    let divisor = u32::try_from(unknown.len()).unwrap_or(u32::MAX);
    let share = remaining
        .divided_by(divisor)
        .ok_or_else(|| type_mismatch(remaining.value_type()))?;
    for sub in &unknown {
        holder.set_array(sub, share.clone(), count)?;
    }
    debug!(
        "Divided {}@{} over {} unknown sub-periods",
        variable.name(),
        period,
        unknown.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::periods::DateUnit;
    use crate::storage::MemoryStorage;
    use crate::variables::{BaseFunction, Variable};

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn holder(policy: Option<SetInputPolicy>) -> Holder {
        let mut builder = Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue);
        if let Some(policy) = policy {
            builder = builder.set_input(policy);
        }
        Holder::new(Arc::new(builder.build().unwrap()), Box::new(MemoryStorage::new()))
    }

    fn month_value(holder: &Holder, month: &str) -> f64 {
        holder.get_array(&p(month)).unwrap().unwrap().as_float().unwrap()[0]
    }

    #[test]
    fn test_native_period_stored_directly() {
        let mut holder = holder(None);
        set_input(&mut holder, &p("2014-03"), Array::Float(vec![1000.0]), 1).unwrap();
        assert_eq!(holder.known_periods().len(), 1);
        assert_relative_eq!(month_value(&holder, "2014-03"), 1000.0);
    }

    #[test]
    fn test_broad_period_without_policy_is_rejected() {
        let mut holder = holder(None);
        let err = set_input(&mut holder, &p("2014"), Array::Float(vec![12.0]), 1).unwrap_err();
        assert!(matches!(err, EngineError::PeriodMismatch { .. }));

        // Narrower than the definition period cannot be spread either
        let mut divided = holder_with_year();
        assert!(set_input(&mut divided, &p("2014-01"), Array::Float(vec![1.0]), 1).is_err());
    }

    fn holder_with_year() -> Holder {
        let variable = Variable::builder("tax", "person", ValueType::Float, DateUnit::Year)
            .set_input(SetInputPolicy::DivideByPeriod)
            .build()
            .unwrap();
        Holder::new(Arc::new(variable), Box::new(MemoryStorage::new()))
    }

    #[test]
    fn test_dispatch_keeps_explicit_sub_periods() {
        let mut holder = holder(Some(SetInputPolicy::DispatchByPeriod));
        set_input(&mut holder, &p("2014-03"), Array::Float(vec![5.0]), 1).unwrap();
        set_input(&mut holder, &p("2014"), Array::Float(vec![100.0]), 1).unwrap();

        assert_eq!(holder.known_periods().len(), 12);
        assert_relative_eq!(month_value(&holder, "2014-01"), 100.0);
        assert_relative_eq!(month_value(&holder, "2014-03"), 5.0);
        assert!(holder.get_array(&p("2014")).unwrap().is_none());
    }

    #[test]
    fn test_divide_spreads_remainder() {
        let mut holder = holder(Some(SetInputPolicy::DivideByPeriod));
        set_input(&mut holder, &p("2014-03"), Array::Float(vec![300.0]), 1).unwrap();
        set_input(&mut holder, &p("2014"), Array::Float(vec![1400.0]), 1).unwrap();

        assert_relative_eq!(month_value(&holder, "2014-03"), 300.0);
        assert_relative_eq!(month_value(&holder, "2014-01"), 100.0);
        assert_relative_eq!(month_value(&holder, "2014-12"), 100.0);
    }

    #[test]
    fn test_divide_with_every_sub_period_known() {
        let mut holder = holder(Some(SetInputPolicy::DivideByPeriod));
        set_input(&mut holder, &p("2014"), Array::Float(vec![1200.0]), 1).unwrap();

        // Matching total is accepted, a different one is not
        set_input(&mut holder, &p("2014"), Array::Float(vec![1200.0]), 1).unwrap();
        let err = set_input(&mut holder, &p("2014"), Array::Float(vec![1300.0]), 1).unwrap_err();
        assert!(matches!(err, EngineError::InconsistentInput { .. }));
    }

    #[test]
    fn test_population_mismatch() {
        let mut holder = holder(Some(SetInputPolicy::DivideByPeriod));
        let err = set_input(&mut holder, &p("2014"), Array::Float(vec![1.0, 2.0]), 3).unwrap_err();
        assert!(matches!(err, EngineError::PopulationMismatch { .. }));
    }
}
