//! Variable definitions
//!
//! A [`Variable`] declares what the engine may compute: its entity, value type,
//! definition period, kind and the base-function policy reconciling requested
//! periods with that definition period. Definitions are built once through
//! [`VariableBuilder`], validated, and shared immutably afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! let salary = Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
//!     .base_function(BaseFunction::AddedValue)
//!     .set_input(SetInputPolicy::DivideByPeriod)
//!     .build()?;
//! ```

mod formula;

pub use formula::{DatedFormula, DatedFormulas, FormulaFn};

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::arrays::{Array, EnumTable, Value, ValueType};
use crate::error::{EngineError, EngineResult};
use crate::periods::{DateUnit, Instant};

/// How a variable's values relate across periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// A single value for all time (defined for eternity)
    Permanent,
    /// Constant until superseded: the last known value carries forward
    PeriodSizeIndependent,
    /// Computed for each requested period
    Ordinary,
}

/// Strategy reconciling a requested period with the cache and the formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseFunction {
    /// Compute once, reuse for every period
    Permanent,
    /// Reuse the most recent known value starting at or before the request
    LastValue,
    /// Run the formula for exactly the requested period, else the default
    DefaultValue,
    /// Sum over the definition-period sub-periods of a broader request
    AddedValue,
    /// Value of the first sub-period of a broader request
    FirstSubPeriodValue,
}

/// What happens when an input is given for a period broader than the
/// definition period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetInputPolicy {
    /// Copy the value to every sub-period that has no value yet
    DispatchByPeriod,
    /// Spread what is left of the total evenly over unknown sub-periods
    DivideByPeriod,
}

/// Immutable definition of a variable
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    entity: String,
    value_type: ValueType,
    definition_period: DateUnit,
    kind: VariableKind,
    base_function: Option<BaseFunction>,
    set_input: Option<SetInputPolicy>,
    default: Value,
    possible_values: Option<Arc<EnumTable>>,
    formulas: DatedFormulas,
    neutralized: bool,
    label: Option<String>,
}

impl Variable {
    pub fn builder(name: &str, entity: &str, value_type: ValueType, definition_period: DateUnit) -> VariableBuilder {
        VariableBuilder::new(name, entity, value_type, definition_period)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the entity whose population holds this variable
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn definition_period(&self) -> DateUnit {
        self.definition_period
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Base function to apply: the explicit override, else the kind's default
    pub fn base_function(&self) -> BaseFunction {
        self.base_function.unwrap_or(match self.kind {
            VariableKind::Permanent => BaseFunction::Permanent,
            VariableKind::PeriodSizeIndependent => BaseFunction::LastValue,
            VariableKind::Ordinary => BaseFunction::DefaultValue,
        })
    }

    pub fn set_input(&self) -> Option<SetInputPolicy> {
        self.set_input
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn possible_values(&self) -> Option<&Arc<EnumTable>> {
        self.possible_values.as_ref()
    }

    pub fn formulas(&self) -> &DatedFormulas {
        &self.formulas
    }

    pub fn has_formula(&self) -> bool {
        !self.formulas.is_empty()
    }

    /// Neutralized variables ignore inputs and formulas and always hold
    /// their default value
    pub fn is_neutralized(&self) -> bool {
        self.neutralized
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Default value broadcast to `count` cells
    pub fn default_array(&self, count: usize) -> Array {
        Array::filled(&self.default, count, self.possible_values.as_ref())
    }

    /// Copy of this definition that always yields its default
    pub fn neutralized(&self) -> Variable {
        Variable {
            formulas: DatedFormulas::default(),
            neutralized: true,
            ..self.clone()
        }
    }
}

/// Builder for [`Variable`]; `build` validates the definition
#[derive(Debug, Clone)]
pub struct VariableBuilder {
    name: String,
    entity: String,
    value_type: ValueType,
    definition_period: DateUnit,
    period_size_independent: bool,
    base_function: Option<BaseFunction>,
    set_input: Option<SetInputPolicy>,
    default: Option<Value>,
    possible_values: Option<Arc<EnumTable>>,
    formulas: Vec<(DatedFormula, bool)>,
    label: Option<String>,
}

impl VariableBuilder {
    pub fn new(name: &str, entity: &str, value_type: ValueType, definition_period: DateUnit) -> Self {
        Self {
            name: name.to_string(),
            entity: entity.to_string(),
            value_type,
            definition_period,
            period_size_independent: false,
            base_function: None,
            set_input: None,
            default: None,
            possible_values: None,
            formulas: Vec::new(),
            label: None,
        }
    }

    /// Mark the variable as constant until superseded
    pub fn period_size_independent(mut self) -> Self {
        self.period_size_independent = true;
        self
    }

    pub fn base_function(mut self, base_function: BaseFunction) -> Self {
        self.base_function = Some(base_function);
        self
    }

    pub fn set_input(mut self, policy: SetInputPolicy) -> Self {
        self.set_input = Some(policy);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Category table of an enumerated variable
    pub fn possible_values(mut self, table: Arc<EnumTable>) -> Self {
        self.possible_values = Some(table);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Formula valid for all time, or until the next formula starts
    pub fn formula(mut self, function: FormulaFn) -> Self {
        self.formulas.push((
            DatedFormula {
                start: None,
                stop: None,
                function,
            },
            true,
        ));
        self
    }

    /// Formula valid from `start` until the next formula starts
    pub fn formula_since(mut self, start: Instant, function: FormulaFn) -> Self {
        self.formulas.push((
            DatedFormula {
                start: Some(start),
                stop: None,
                function,
            },
            true,
        ));
        self
    }

    /// Formula valid from `start` to `stop`, both included
    pub fn formula_between(mut self, start: Instant, stop: Instant, function: FormulaFn) -> Self {
        self.formulas.push((
            DatedFormula {
                start: Some(start),
                stop: Some(stop),
                function,
            },
            false,
        ));
        self
    }

    pub fn build(self) -> EngineResult<Variable> {
        let invalid = |reason: String| EngineError::InvalidVariable {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("name cannot be empty".to_string()));
        }

        let kind = match (self.definition_period, self.period_size_independent) {
            (DateUnit::Eternity, false) => VariableKind::Permanent,
            (DateUnit::Eternity, true) => {
                return Err(invalid(
                    "a variable defined for eternity cannot also be period size independent".to_string(),
                ))
            }
            (_, true) => VariableKind::PeriodSizeIndependent,
            (_, false) => VariableKind::Ordinary,
        };

        match (kind, self.base_function) {
            (VariableKind::Permanent, Some(b)) if b != BaseFunction::Permanent => {
                return Err(invalid(format!("permanent variables cannot use {:?}", b)))
            }
            (VariableKind::PeriodSizeIndependent | VariableKind::Ordinary, Some(BaseFunction::Permanent)) => {
                return Err(invalid(
                    "only variables defined for eternity can use the permanent base function".to_string(),
                ))
            }
            (_, Some(BaseFunction::AddedValue)) if !self.value_type.is_numeric() => {
                return Err(invalid(format!("{} values cannot be added", self.value_type)))
            }
            _ => {}
        }

        if let Some(policy) = self.set_input {
            if kind == VariableKind::Permanent {
                return Err(invalid("permanent variables take a single input".to_string()));
            }
            if policy == SetInputPolicy::DivideByPeriod && !self.value_type.is_numeric() {
                return Err(invalid(format!("{} values cannot be divided", self.value_type)));
            }
        }

        let possible_values = match (self.value_type, self.possible_values) {
            (ValueType::Enum, None) => {
                return Err(invalid("enumerated variables need possible values".to_string()))
            }
            (ValueType::Enum, Some(table)) if table.is_empty() => {
                return Err(invalid("enumerated variables need at least one possible value".to_string()))
            }
            (ValueType::Enum, Some(table)) => Some(table),
            (_, Some(_)) => {
                return Err(invalid(format!("{} variables cannot have possible values", self.value_type)))
            }
            (_, None) => None,
        };

        let default = self.default.unwrap_or_else(|| natural_default(self.value_type));
        if default.value_type() != self.value_type {
            return Err(invalid(format!(
                "default value is {} but the variable holds {} values",
                default.value_type(),
                self.value_type
            )));
        }
        if let (Value::Enum(code), Some(table)) = (&default, &possible_values) {
            if table.label(*code).is_none() {
                return Err(invalid(format!("default code {} is not a possible value", code)));
            }
        }

        let formulas = DatedFormulas::from_entries(self.formulas).map_err(invalid)?;

        Ok(Variable {
            name: self.name,
            entity: self.entity,
            value_type: self.value_type,
            definition_period: self.definition_period,
            kind,
            base_function: self.base_function,
            set_input: self.set_input,
            default,
            possible_values,
            formulas,
            neutralized: false,
            label: self.label,
        })
    }
}

fn natural_default(value_type: ValueType) -> Value {
    match value_type {
        ValueType::Float => Value::Float(0.0),
        ValueType::Int => Value::Int(0),
        ValueType::Bool => Value::Bool(false),
        ValueType::Date => Value::Date(NaiveDate::default()),
        ValueType::Enum => Value::Enum(0),
    }
}
