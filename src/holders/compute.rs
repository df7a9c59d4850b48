//! Cache-first resolution of a variable for a period
//!
//! ```text
//! compute(V, P)
//!   ├─ cached under P?            → return it
//!   ├─ base function of V
//!   │   ├─ Permanent              → formula once, stored under eternity
//!   │   ├─ LastValue              → latest known period starting ≤ P, else formula
//!   │   ├─ DefaultValue           → formula for exactly P, whatever its size
//!   │   ├─ AddedValue             → Σ compute(V, sub) over definition-period subs
//!   │   └─ FirstSubPeriodValue    → value of the first sub-period
//!   └─ store under exactly P
//! ```
//!
//! "Formula" always means the dated formula whose window contains the start of
//! the period it runs for; when the variable has formulas but none applies,
//! the default value is used instead.

use std::sync::Arc;

use log::{debug, warn};

use super::HolderId;
use crate::arrays::Array;
use crate::config::SpiralFallback;
use crate::error::{EngineError, EngineResult};
use crate::periods::Period;
use crate::simulation::{PopulationView, Simulation};
use crate::variables::{BaseFunction, FormulaFn, Variable, VariableKind};

/// Outcome of a resolution step
enum Resolved {
    /// To be stored under the requested period
    Value(Array),
    /// Fallback value that must not be cached
    Uncached(Array),
}

/// Formula applicable to a period
enum Selection {
    /// The variable has no formula at all
    NoFormula,
    /// The variable has formulas but none covers the period start
    OutOfWindow,
    Formula(FormulaFn),
}

/// Value of the holder's variable for exactly `period`, computing and caching
/// it when absent
pub(crate) fn compute(sim: &mut Simulation, id: HolderId, period: &Period) -> EngineResult<Array> {
    let variable = Arc::clone(sim.holder(id).variable());
    let count = sim.count_of(&variable)?;
    let period = match variable.kind() {
        VariableKind::Permanent => Period::eternity(),
        _ => *period,
    };

    if let Some(array) = sim.holder(id).get_array(&period)? {
        debug!("Cache hit for {}@{}", variable.name(), period);
        return Ok(array);
    }

    let resolved = if variable.is_neutralized() {
        Resolved::Value(variable.default_array(count))
    } else {
        debug!("Cache miss for {}@{}", variable.name(), period);
        resolve(sim, id, &variable, &period, count)?
    };

    match resolved {
        Resolved::Value(array) => {
            let stored = sim.holder_mut(id).set_array(&period, array, count)?;
            sim.record_computed(id, period);
            Ok(stored)
        }
        Resolved::Uncached(array) => Ok(array),
    }
}

fn resolve(
    sim: &mut Simulation,
    id: HolderId,
    variable: &Variable,
    period: &Period,
    count: usize,
) -> EngineResult<Resolved> {
    let native = variable.definition_period();
    let is_native = period.unit() == native && period.size() == 1;

    match variable.base_function() {
        BaseFunction::Permanent => run_or_default(sim, variable, period, count),

        BaseFunction::LastValue => {
            let selection = select(variable, period);
            if let Selection::OutOfWindow = selection {
                return Ok(Resolved::Value(variable.default_array(count)));
            }
            let covering = matches!(selection, Selection::Formula(_));
            if let Some(known) = sim.holder(id).last_known_period(period, covering) {
                if let Some(array) = sim.holder(id).get_array(&known)? {
                    debug!("Reusing {}@{} for {}", variable.name(), known, period);
                    return Ok(Resolved::Value(array));
                }
            }
            run_or_default(sim, variable, period, count)
        }

        BaseFunction::DefaultValue => run_or_default(sim, variable, period, count),

        BaseFunction::AddedValue => {
            if is_native {
                return run_or_default(sim, variable, period, count);
            }
            if period.size_in(native).is_none() {
                return Err(period_mismatch(variable, period));
            }
            let mut total: Option<Array> = None;
            for sub in period.sub_periods(native) {
                let value = compute(sim, id, &sub)?;
                total = Some(match total {
                    None => value,
                    Some(sum) => sum.checked_add(&value).ok_or_else(|| EngineError::ValueTypeMismatch {
                        variable: variable.name().to_string(),
                        expected: variable.value_type(),
                        actual: value.value_type(),
                    })?,
                });
            }
            Ok(Resolved::Value(total.unwrap_or_else(|| variable.default_array(count))))
        }

        BaseFunction::FirstSubPeriodValue => {
            if is_native {
                return run_or_default(sim, variable, period, count);
            }
            if period.size_in(native).is_none() {
                return Err(period_mismatch(variable, period));
            }
            let mut subs = period.sub_periods(native);
            let Some(first) = subs.next() else {
                return Ok(Resolved::Value(variable.default_array(count)));
            };
            if let Some(array) = sim.holder(id).get_array(&first)? {
                return Ok(Resolved::Value(array));
            }
            if let Selection::Formula(_) = select(variable, &first) {
                return Ok(Resolved::Value(compute(sim, id, &first)?));
            }
            for sub in subs {
                if let Some(array) = sim.holder(id).get_array(&sub)? {
                    debug!("Using {}@{} as the value for {}", variable.name(), sub, period);
                    return Ok(Resolved::Value(array));
                }
            }
            Ok(Resolved::Value(variable.default_array(count)))
        }
    }
}

fn select(variable: &Variable, period: &Period) -> Selection {
    let formulas = variable.formulas();
    if formulas.is_empty() {
        return Selection::NoFormula;
    }
    match formulas.find(period.start()) {
        Some(formula) => {
            if formula.coverage(period).as_ref() != Some(period) {
                debug!(
                    "Formula of {} starting {:?} only covers part of {}",
                    variable.name(),
                    formula.start,
                    period
                );
            }
            Selection::Formula(formula.function)
        }
        None => {
            debug!("No formula of {} applies at {}; using its default", variable.name(), period.start());
            Selection::OutOfWindow
        }
    }
}

/// Run the applicable formula for exactly `period`, or fall back to the default
fn run_or_default(
    sim: &mut Simulation,
    variable: &Variable,
    period: &Period,
    count: usize,
) -> EngineResult<Resolved> {
    match select(variable, period) {
        Selection::Formula(function) => match run_formula(sim, variable, function, period, count)? {
            Some(array) => Ok(Resolved::Value(array)),
            None => Ok(Resolved::Uncached(variable.default_array(count))),
        },
        Selection::NoFormula | Selection::OutOfWindow => Ok(Resolved::Value(variable.default_array(count))),
    }
}

/// Invoke a formula inside a guard frame and check its result
///
/// Returns `None` when the guard detected a spiral and the simulation is
/// configured to fall back to default values.
fn run_formula(
    sim: &mut Simulation,
    variable: &Variable,
    function: FormulaFn,
    period: &Period,
    count: usize,
) -> EngineResult<Option<Array>> {
    let legislation = Arc::clone(sim.legislation());
    let outcome = sim.guarded(variable.name(), period, |sim| {
        let mut view = PopulationView::new(sim, variable.entity(), count);
        function(&mut view, period, &legislation)
    });

    let array = match outcome {
        Ok(array) => array,
        Err(err) if err.is_spiral() && sim.config().spiral_fallback == SpiralFallback::DefaultValue => {
            warn!("{}; using the default value of {} for {}", err, variable.name(), period);
            sim.mark_fallback();
            return Ok(None);
        }
        Err(EngineError::FormulaFailed { reason }) => return Err(formula_error(variable, period, reason)),
        Err(err) => return Err(err),
    };

    if array.len() != count {
        return Err(formula_error(
            variable,
            period,
            format!("returned {} values for a population of {}", array.len(), count),
        ));
    }
    let actual = array.value_type();
    let array = array.cast(variable.value_type()).ok_or_else(|| {
        formula_error(
            variable,
            period,
            format!("returned {} values, expected {}", actual, variable.value_type()),
        )
    })?;

    debug!("Computed {}@{}", variable.name(), period);
    Ok(Some(array))
}

fn formula_error(variable: &Variable, period: &Period, reason: String) -> EngineError {
    EngineError::FormulaComputation {
        variable: variable.name().to_string(),
        period: *period,
        entity: variable.entity().to_string(),
        reason,
    }
}

fn period_mismatch(variable: &Variable, period: &Period) -> EngineError {
    EngineError::PeriodMismatch {
        variable: variable.name().to_string(),
        period: *period,
        definition_period: variable.definition_period(),
    }
}
