//! Tax and benefit system: the registry of entities and variables
//!
//! A system is assembled once at startup and then shared read-only between
//! simulations. Reforms are derived by cloning a system and replacing or
//! neutralizing some of its variables; variable definitions are reference
//! counted, so the clone is cheap.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::error::{EngineError, EngineResult};
use crate::variables::Variable;

/// Kind of population variables are defined on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub key: String,
    pub plural: String,
    /// Persons are the members of every group entity
    pub is_person: bool,
}

impl Entity {
    pub fn person(key: &str, plural: &str) -> Self {
        Self {
            key: key.to_string(),
            plural: plural.to_string(),
            is_person: true,
        }
    }

    pub fn group(key: &str, plural: &str) -> Self {
        Self {
            key: key.to_string(),
            plural: plural.to_string(),
            is_person: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaxBenefitSystem {
    name: String,
    entities: BTreeMap<String, Entity>,
    variables: BTreeMap<String, Arc<Variable>>,
}

impl TaxBenefitSystem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an entity; at most one person entity is allowed
    pub fn add_entity(&mut self, entity: Entity) -> EngineResult<()> {
        if entity.is_person {
            if let Some(existing) = self.entities.values().find(|e| e.is_person && e.key != entity.key) {
                return Err(EngineError::InvalidEntity {
                    key: entity.key.clone(),
                    reason: format!("'{}' is already the person entity", existing.key),
                });
            }
        }
        self.entities.insert(entity.key.clone(), entity);
        Ok(())
    }

    pub fn entity(&self, key: &str) -> EngineResult<&Entity> {
        self.entities.get(key).ok_or_else(|| EngineError::EntityNotFound {
            key: key.to_string(),
        })
    }

    pub fn person_entity(&self) -> EngineResult<&Entity> {
        self.entities
            .values()
            .find(|e| e.is_person)
            .ok_or_else(|| EngineError::EntityNotFound {
                key: "person".to_string(),
            })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Register a new variable; its entity must be known and its name unused
    pub fn add_variable(&mut self, variable: Variable) -> EngineResult<()> {
        self.entity(variable.entity())?;
        if self.variables.contains_key(variable.name()) {
            return Err(EngineError::InvalidVariable {
                name: variable.name().to_string(),
                reason: "a variable with this name is already registered".to_string(),
            });
        }
        debug!("Registering variable {} on {}", variable.name(), variable.entity());
        self.variables.insert(variable.name().to_string(), Arc::new(variable));
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> EngineResult<&Arc<Variable>> {
        self.variables.get(name).ok_or_else(|| EngineError::VariableNotFound {
            name: name.to_string(),
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &Arc<Variable>> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Copy of this system under a new name, to be modified as a reform
    pub fn reform(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Swap the definition of an existing variable
    pub fn replace_variable(&mut self, variable: Variable) -> EngineResult<()> {
        self.get_variable(variable.name())?;
        self.entity(variable.entity())?;
        debug!("Replacing variable {} in {}", variable.name(), self.name);
        self.variables.insert(variable.name().to_string(), Arc::new(variable));
        Ok(())
    }

    /// Make a variable always yield its default value
    pub fn neutralize_variable(&mut self, name: &str) -> EngineResult<()> {
        let neutral = self.get_variable(name)?.neutralized();
        debug!("Neutralizing variable {} in {}", name, self.name);
        self.variables.insert(name.to_string(), Arc::new(neutral));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::ValueType;
    use crate::periods::DateUnit;

    fn system() -> TaxBenefitSystem {
        let mut system = TaxBenefitSystem::new("test");
        system.add_entity(Entity::person("person", "persons")).unwrap();
        system.add_entity(Entity::group("household", "households")).unwrap();
        system
            .add_variable(
                Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        system
    }

    #[test]
    fn test_lookup() {
        let system = system();
        assert_eq!(system.get_variable("salary").unwrap().name(), "salary");
        assert!(matches!(
            system.get_variable("wage"),
            Err(EngineError::VariableNotFound { .. })
        ));
        assert_eq!(system.person_entity().unwrap().key, "person");
        assert_eq!(system.entities().count(), 2);
    }

    #[test]
    fn test_add_variable_checks() {
        let mut system = system();
        let duplicate = Variable::builder("salary", "person", ValueType::Float, DateUnit::Month)
            .build()
            .unwrap();
        assert!(system.add_variable(duplicate).is_err());

        let orphan = Variable::builder("rent", "flat", ValueType::Float, DateUnit::Month)
            .build()
            .unwrap();
        assert!(matches!(
            system.add_variable(orphan),
            Err(EngineError::EntityNotFound { .. })
        ));

        assert!(system.add_entity(Entity::person("individual", "individuals")).is_err());
    }

    #[test]
    fn test_reform_leaves_baseline_untouched() {
        let baseline = system();
        let mut reform = baseline.reform("no_salary");
        reform.neutralize_variable("salary").unwrap();

        assert_eq!(reform.name(), "no_salary");
        assert!(reform.get_variable("salary").unwrap().is_neutralized());
        assert!(!baseline.get_variable("salary").unwrap().is_neutralized());

        let yearly = Variable::builder("salary", "person", ValueType::Float, DateUnit::Year)
            .build()
            .unwrap();
        reform.replace_variable(yearly).unwrap();
        assert_eq!(reform.get_variable("salary").unwrap().definition_period(), DateUnit::Year);

        let unknown = Variable::builder("bonus", "person", ValueType::Float, DateUnit::Year)
            .build()
            .unwrap();
        assert!(reform.replace_variable(unknown).is_err());
    }
}
