//! Populations and the accessor formulas use to reach other variables

use log::debug;

use crate::arrays::{Array, EnumArray, ValueType};
use crate::error::{EngineError, EngineResult};
use crate::periods::Period;

use super::Simulation;

/// Members of one entity in a simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    entity: String,
    count: usize,
    /// For group entities, the group index of every person
    membership: Option<Vec<usize>>,
}

impl Population {
    pub(crate) fn persons(entity: &str, count: usize) -> Self {
        Self {
            entity: entity.to_string(),
            count,
            membership: None,
        }
    }

    pub(crate) fn groups(entity: &str, count: usize, membership: Vec<usize>) -> EngineResult<Self> {
        if let Some(index) = membership.iter().find(|&&group| group >= count) {
            return Err(EngineError::InvalidEntity {
                key: entity.to_string(),
                reason: format!("membership refers to group {} but there are only {}", index, count),
            });
        }
        Ok(Self {
            entity: entity.to_string(),
            count,
            membership: Some(membership),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Group index of every person; `None` for the person population
    pub fn membership(&self) -> Option<&[usize]> {
        self.membership.as_deref()
    }
}

/// Value given to a formula helper: an array already at hand, or a variable
/// to compute for the helper's period
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<'o> {
    Array(Array),
    Cached(&'o str),
}

impl From<Array> for Operand<'_> {
    fn from(array: Array) -> Self {
        Operand::Array(array)
    }
}

impl<'o> From<&'o str> for Operand<'o> {
    fn from(variable: &'o str) -> Self {
        Operand::Cached(variable)
    }
}

/// What a formula sees of its simulation: one population and a way to
/// request any other variable
pub struct PopulationView<'a> {
    simulation: &'a mut Simulation,
    entity: String,
    count: usize,
}

impl<'a> PopulationView<'a> {
    pub(crate) fn new(simulation: &'a mut Simulation, entity: &str, count: usize) -> Self {
        Self {
            simulation,
            entity: entity.to_string(),
            count,
        }
    }

    /// Key of the entity this view is on
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Number of members; every formula result must have this length
    pub fn count(&self) -> usize {
        self.count
    }

    /// Value of a variable of this view's entity
    pub fn calculate(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        self.check_entity(variable)?;
        self.simulation.compute_variable(variable, period)
    }

    /// Sum of a variable over the definition-period sub-periods of `period`
    pub fn calculate_add(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        self.check_entity(variable)?;
        self.simulation.add_variable_over(variable, period)
    }

    /// Share of a yearly variable for a month
    pub fn calculate_divide(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        self.check_entity(variable)?;
        self.simulation.divide_variable_over(variable, period)
    }

    /// Value of a variable as floats
    pub fn floats(&mut self, variable: &str, period: &Period) -> EngineResult<Vec<f64>> {
        let array = self.calculate(variable, period)?;
        array
            .to_floats()
            .ok_or_else(|| EngineError::formula(format!("{} is not numeric", variable)))
    }

    /// Coerce an operand to an array for `period`
    pub fn resolve(&mut self, operand: Operand<'_>, period: &Period) -> EngineResult<Array> {
        match operand {
            Operand::Array(array) if array.len() == self.count => Ok(array),
            Operand::Array(array) => Err(EngineError::formula(format!(
                "operand has {} values for a population of {}",
                array.len(),
                self.count
            ))),
            Operand::Cached(variable) => self.calculate(variable, period),
        }
    }

    /// Sum a person variable over the members of each group of this view
    pub fn sum_members(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        let membership = self.membership()?;
        let values = self.person_values(variable, period)?;
        self.check_members(&membership, variable, values.len())?;

        match values {
            Array::Float(values) => {
                let mut sums = vec![0.0; self.count];
                for (person, value) in values.into_iter().enumerate() {
                    sums[membership[person]] += value;
                }
                Ok(Array::Float(sums))
            }
            Array::Int(values) => {
                let mut sums = vec![0; self.count];
                for (person, value) in values.into_iter().enumerate() {
                    sums[membership[person]] += value;
                }
                Ok(Array::Int(sums))
            }
            other => Err(EngineError::formula(format!(
                "cannot sum {} values of {}",
                other.value_type(),
                variable
            ))),
        }
    }

    /// Whether any member of each group of this view satisfies a boolean
    /// person variable
    pub fn any_member(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        let membership = self.membership()?;
        let values = self.person_values(variable, period)?;
        let flags = values
            .as_bool()
            .ok_or_else(|| EngineError::formula(format!("{} is not boolean", variable)))?;
        self.check_members(&membership, variable, flags.len())?;

        let mut any = vec![false; self.count];
        for (person, &flag) in flags.iter().enumerate() {
            any[membership[person]] |= flag;
        }
        Ok(Array::Bool(any))
    }

    /// Give every person the value of their group
    ///
    /// Must be called on the person view; `group` is the group entity key.
    pub fn project_from_group(&mut self, group: &str, variable: &str, period: &Period) -> EngineResult<Array> {
        let owner = self.simulation.system().get_variable(variable)?.entity().to_string();
        if owner != group {
            return Err(EngineError::formula(format!(
                "{} belongs to {}, not {}",
                variable, owner, group
            )));
        }
        let membership: Vec<usize> = self
            .simulation
            .population(group)?
            .membership()
            .ok_or_else(|| EngineError::formula(format!("{} is not a group entity", group)))?
            .to_vec();
        if membership.len() != self.count {
            return Err(EngineError::formula(format!(
                "{} is not the person population of {}",
                self.entity, group
            )));
        }

        debug!("Projecting {} from {} to {}", variable, group, self.entity);
        let values = self.simulation.compute_variable(variable, period)?;
        Ok(match values {
            Array::Float(v) => Array::Float(membership.iter().map(|&g| v[g]).collect()),
            Array::Int(v) => Array::Int(membership.iter().map(|&g| v[g]).collect()),
            Array::Bool(v) => Array::Bool(membership.iter().map(|&g| v[g]).collect()),
            Array::Date(v) => Array::Date(membership.iter().map(|&g| v[g]).collect()),
            Array::Enum(e) => Array::Enum(EnumArray::new(
                membership.iter().map(|&g| e.codes[g]).collect(),
                e.table,
            )),
        })
    }

    fn membership(&self) -> EngineResult<Vec<usize>> {
        self.simulation
            .population(&self.entity)?
            .membership()
            .map(<[usize]>::to_vec)
            .ok_or_else(|| EngineError::formula(format!("{} is not a group entity", self.entity)))
    }

    /// Every person value must map to a group of this view
    fn check_members(&self, membership: &[usize], variable: &str, persons: usize) -> EngineResult<()> {
        if membership.len() != persons || membership.iter().any(|&group| group >= self.count) {
            return Err(EngineError::formula(format!(
                "{} has {} values but {} lists {} members",
                variable,
                persons,
                self.entity,
                membership.len()
            )));
        }
        Ok(())
    }

    fn person_values(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        let person = self.simulation.system().person_entity()?.key.clone();
        let owner = self.simulation.system().get_variable(variable)?.entity().to_string();
        if owner != person {
            return Err(EngineError::formula(format!(
                "{} belongs to {}, not to the members of {}",
                variable, owner, self.entity
            )));
        }
        let values = self.simulation.compute_variable(variable, period)?;
        if values.value_type() == ValueType::Enum {
            return Err(EngineError::formula(format!("cannot aggregate enum variable {}", variable)));
        }
        Ok(values)
    }

    fn check_entity(&self, variable: &str) -> EngineResult<()> {
        let owner = self.simulation.system().get_variable(variable)?.entity();
        if owner != self.entity {
            return Err(EngineError::formula(format!(
                "{} belongs to {}; a formula on {} must go through its members or its group",
                variable, owner, self.entity
            )));
        }
        Ok(())
    }
}
