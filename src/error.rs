//! Error taxonomy of the engine
//!
//! Every failure is a programmer or data error (bad legislation data, buggy
//! formula, circular definition); nothing here is retried. Values cached before
//! a failed calculation stay valid.

use std::fmt;

use thiserror::Error;

use crate::arrays::ValueType;
use crate::periods::{DateUnit, Instant, Period, PeriodParseError};
use crate::storage::StorageError;

/// `(variable, period)` frames on the computation stack, outermost first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputationChain(pub Vec<(String, Period)>);

impl fmt::Display for ComputationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (variable, period)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}@{}", variable, period)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Circular definition detected on formula {variable}@{period}. Formulas and periods involved: {chain}")]
    Cycle {
        variable: String,
        period: Period,
        chain: ComputationChain,
    },

    #[error("Quasicircular definition detected on formula {variable}@{period}: {variable} re-entered {loops} times. Formulas and periods involved: {chain}")]
    Spiral {
        variable: String,
        period: Period,
        loops: usize,
        chain: ComputationChain,
    },

    #[error(transparent)]
    PeriodParse(#[from] PeriodParseError),

    #[error("Formula of variable '{variable}' failed for period {period} on entity '{entity}': {reason}")]
    FormulaComputation {
        variable: String,
        period: Period,
        entity: String,
        reason: String,
    },

    /// Raised by formula implementations; wrapped into `FormulaComputation`
    /// with variable, period and entity context by the dispatcher
    #[error("{reason}")]
    FormulaFailed { reason: String },

    #[error("Variable '{name}' was not found in the tax and benefit system")]
    VariableNotFound { name: String },

    #[error("Entity '{key}' was not found in the tax and benefit system")]
    EntityNotFound { key: String },

    #[error("Invalid entity or population '{key}': {reason}")]
    InvalidEntity { key: String, reason: String },

    #[error("Invalid input for variable '{variable}': {reason}")]
    InvalidInput { variable: String, reason: String },

    #[error("Unable to store {actual} values for variable '{variable}': its population has {expected} members")]
    PopulationMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    #[error("Variable '{variable}' expects {expected} values, got {actual} values that cannot be converted")]
    ValueTypeMismatch {
        variable: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Unable to use period {period} for variable '{variable}': it is defined {}", .definition_period.adverb())]
    PeriodMismatch {
        variable: String,
        period: Period,
        definition_period: DateUnit,
    },

    #[error("Inconsistent input: variable '{variable}' is already set for every sub-period of {period} and the value given for {period} does not match their total")]
    InconsistentInput { variable: String, period: Period },

    #[error("Invalid definition of variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("Parameter '{path}' has no value at {instant}")]
    ParameterNotFound { path: String, instant: Instant },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Failure raised from inside a formula
    pub fn formula(reason: impl Into<String>) -> Self {
        Self::FormulaFailed {
            reason: reason.into(),
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    pub fn is_spiral(&self) -> bool {
        matches!(self, Self::Spiral { .. })
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = EngineError::Cycle {
            variable: "a".to_string(),
            period: p("2014"),
            chain: ComputationChain(vec![("a".to_string(), p("2014")), ("b".to_string(), p("2014"))]),
        };
        let msg = err.to_string();
        assert!(msg.contains("Circular definition"));
        assert!(msg.contains("a@2014 -> b@2014"));
        assert!(err.is_cycle());
        assert!(!err.is_spiral());
    }

    #[test]
    fn test_period_mismatch_message() {
        let err = EngineError::PeriodMismatch {
            variable: "salary".to_string(),
            period: p("2014-03"),
            definition_period: DateUnit::Year,
        };
        assert!(err.to_string().contains("defined yearly"));
    }

    #[test]
    fn test_parse_error_converts() {
        let err: EngineError = "2014-13".parse::<Period>().unwrap_err().into();
        assert!(err.to_string().contains("2014-13"));
    }
}
