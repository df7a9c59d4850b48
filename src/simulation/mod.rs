//! Simulations: populations, holders and the calculation entry points
//!
//! A [`Simulation`] owns one [`Holder`] per variable it has touched, stored in
//! a flat arena and created lazily. Formulas reach other variables through a
//! [`PopulationView`] borrowing the simulation, so the whole evaluation is a
//! single-threaded recursive descent:
//!
//! ```text
//! calculate(V, P)
//!   → holder of V (created on first use)
//!   → compute: cache, base function, dated formula
//!       → formula(view, P, legislation)
//!           → view.calculate(W, Q) → compute(W, Q) → ...
//!   → store under P
//! ```
//!
//! Independent simulations (a baseline and its reforms) share only the
//! immutable system and legislation and can run on separate threads.

mod guard;
mod loader;
mod population;

pub use guard::CycleGuard;
pub use loader::{load_inputs, load_inputs_from_reader, InputRow, InputTable, SimulationBuilder};
pub use population::{Operand, Population, PopulationView};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, info};

use crate::arrays::Array;
use crate::config::{SimulationConfig, SpiralFallback};
use crate::error::{EngineError, EngineResult};
use crate::holders::compute::compute;
use crate::holders::set_input::set_input;
use crate::holders::{Holder, HolderId};
use crate::parameters::Legislation;
use crate::periods::{DateUnit, Period};
use crate::storage::{DiskStorage, MemoryStorage, MemoryUsage, PeriodStorage, SimulationDirectory};
use crate::system::TaxBenefitSystem;
use crate::variables::Variable;

pub struct Simulation {
    system: Arc<TaxBenefitSystem>,
    legislation: Arc<Legislation>,
    config: SimulationConfig,
    populations: BTreeMap<String, Population>,
    holders: Vec<Holder>,
    index: HashMap<String, HolderId>,
    guard: CycleGuard,
    /// Exact keys stored by formulas during the current calculation
    computed: Vec<(HolderId, Period)>,
    /// Whether a spiral fell back to a default during the current calculation
    fallback_used: bool,
    // Declared after `holders` so on-disk storages are dropped first
    directory: Option<SimulationDirectory>,
}

impl Simulation {
    pub fn new(
        system: Arc<TaxBenefitSystem>,
        legislation: Arc<Legislation>,
        config: SimulationConfig,
    ) -> Self {
        info!(
            "New simulation of {} ({} variables)",
            system.name(),
            system.len()
        );
        Self {
            guard: CycleGuard::new(config.max_spiral_loops),
            system,
            legislation,
            config,
            populations: BTreeMap::new(),
            holders: Vec::new(),
            index: HashMap::new(),
            computed: Vec::new(),
            fallback_used: false,
            directory: None,
        }
    }

    pub fn system(&self) -> &TaxBenefitSystem {
        &self.system
    }

    pub fn legislation(&self) -> &Arc<Legislation> {
        &self.legislation
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Declare the person population, once and before anything else
    pub fn add_person_population(&mut self, count: usize) -> EngineResult<()> {
        let key = self.system.person_entity()?.key.clone();
        if self.populations.contains_key(&key) {
            return Err(EngineError::InvalidEntity {
                key,
                reason: "the person population is already declared".to_string(),
            });
        }
        if !self.populations.is_empty() || !self.holders.is_empty() {
            return Err(EngineError::InvalidEntity {
                key,
                reason: "the person population must be declared before groups and values".to_string(),
            });
        }
        self.populations.insert(key.clone(), Population::persons(&key, count));
        Ok(())
    }

    /// Declare a group population; `membership[i]` is the group of person `i`
    pub fn add_group_population(&mut self, entity: &str, count: usize, membership: Vec<usize>) -> EngineResult<()> {
        let group = self.system.entity(entity)?;
        if group.is_person {
            return Err(EngineError::InvalidEntity {
                key: entity.to_string(),
                reason: "the person population has no membership".to_string(),
            });
        }
        let persons = self.population(&self.system.person_entity()?.key)?.count();
        if membership.len() != persons {
            return Err(EngineError::InvalidEntity {
                key: entity.to_string(),
                reason: format!("membership lists {} persons, the simulation has {}", membership.len(), persons),
            });
        }
        let population = Population::groups(entity, count, membership)?;
        self.populations.insert(entity.to_string(), population);
        Ok(())
    }

    pub fn population(&self, entity: &str) -> EngineResult<&Population> {
        self.populations.get(entity).ok_or_else(|| EngineError::InvalidEntity {
            key: entity.to_string(),
            reason: "this simulation has no such population".to_string(),
        })
    }

    /// Value of `variable` for `period`, computed if needed
    pub fn calculate(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        self.top_level(|sim| sim.compute_variable(variable, period))
    }

    /// Sum of `variable` over its definition-period sub-periods of `period`
    pub fn calculate_add(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        self.top_level(|sim| sim.add_variable_over(variable, period))
    }

    /// Monthly share of a yearly variable
    pub fn calculate_divide(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        self.top_level(|sim| sim.divide_variable_over(variable, period))
    }

    /// Give an input value for `period`
    pub fn set_input(&mut self, variable: &str, period: &Period, array: impl Into<Array>) -> EngineResult<()> {
        let id = self.holder_id(variable)?;
        let definition = Arc::clone(self.holders[id.0].variable());
        let count = self.count_of(&definition)?;
        set_input(&mut self.holders[id.0], period, array.into(), count)
    }

    /// Array cached for exactly `period`, without computing anything
    pub fn get_array(&self, variable: &str, period: &Period) -> EngineResult<Option<Array>> {
        self.system.get_variable(variable)?;
        match self.index.get(variable) {
            Some(id) => self.holders[id.0].get_array(period),
            None => Ok(None),
        }
    }

    /// Forget cached values of `variable` within `period` (all when `None`)
    pub fn delete_arrays(&mut self, variable: &str, period: Option<&Period>) -> EngineResult<()> {
        self.system.get_variable(variable)?;
        match self.index.get(variable) {
            Some(id) => self.holders[id.0].delete_arrays(period),
            None => Ok(()),
        }
    }

    pub fn known_periods(&self, variable: &str) -> EngineResult<BTreeSet<Period>> {
        self.system.get_variable(variable)?;
        Ok(self
            .index
            .get(variable)
            .map(|id| self.holders[id.0].known_periods())
            .unwrap_or_default())
    }

    /// Footprint of every holder, by variable
    pub fn memory_usage(&self) -> BTreeMap<String, MemoryUsage> {
        self.holders
            .iter()
            .map(|holder| (holder.variable().name().to_string(), holder.memory_usage()))
            .collect()
    }

    /// Structurally independent copy: same system, legislation and
    /// populations, every cached value copied into fresh storages
    pub fn try_clone(&self) -> EngineResult<Simulation> {
        let mut clone = Simulation::new(
            Arc::clone(&self.system),
            Arc::clone(&self.legislation),
            self.config.clone(),
        );
        clone.populations = self.populations.clone();
        for holder in &self.holders {
            let storage = clone.new_storage(holder.variable())?;
            clone.holders.push(holder.try_clone_into(storage)?);
        }
        clone.index = self.index.clone();
        Ok(clone)
    }

    /// Run one outermost calculation and clean up after it
    fn top_level<T>(&mut self, run: impl FnOnce(&mut Self) -> EngineResult<T>) -> EngineResult<T> {
        let result = run(self);
        self.guard.clear();
        let purged = self.purge_fallback_results();
        let value = result?;
        purged?;
        Ok(value)
    }

    pub(crate) fn compute_variable(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        let id = self.holder_id(variable)?;
        compute(self, id, period)
    }

    pub(crate) fn add_variable_over(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        let definition = Arc::clone(self.system.get_variable(variable)?);
        let native = definition.definition_period();
        if period.unit() == native && period.size() == 1 {
            return self.compute_variable(variable, period);
        }
        if !definition.value_type().is_numeric() || period.size_in(native).is_none() {
            return Err(EngineError::PeriodMismatch {
                variable: variable.to_string(),
                period: *period,
                definition_period: native,
            });
        }

        let mut total: Option<Array> = None;
        for sub in period.sub_periods(native) {
            let value = self.compute_variable(variable, &sub)?;
            total = Some(match total {
                None => value,
                Some(sum) => sum.checked_add(&value).ok_or_else(|| EngineError::ValueTypeMismatch {
                    variable: variable.to_string(),
                    expected: definition.value_type(),
                    actual: value.value_type(),
                })?,
            });
        }
        let count = self.count_of(&definition)?;
        Ok(total.unwrap_or_else(|| definition.default_array(count)))
    }

    pub(crate) fn divide_variable_over(&mut self, variable: &str, period: &Period) -> EngineResult<Array> {
        let definition = Arc::clone(self.system.get_variable(variable)?);
        let native = definition.definition_period();
        if period.unit() == native && period.size() == 1 {
            return self.compute_variable(variable, period);
        }
        let divisible = native == DateUnit::Year
            && period.unit() == DateUnit::Month
            && period.size() == 1
            && definition.value_type().is_numeric();
        if !divisible {
            return Err(EngineError::PeriodMismatch {
                variable: variable.to_string(),
                period: *period,
                definition_period: native,
            });
        }

        let yearly = self.compute_variable(variable, &period.this_year())?;
        yearly.divided_by(12).ok_or_else(|| EngineError::ValueTypeMismatch {
            variable: variable.to_string(),
            expected: definition.value_type(),
            actual: yearly.value_type(),
        })
    }

    /// Holder of `variable`, created on first use
    pub(crate) fn holder_id(&mut self, variable: &str) -> EngineResult<HolderId> {
        if let Some(id) = self.index.get(variable) {
            return Ok(*id);
        }
        let definition = Arc::clone(self.system.get_variable(variable)?);
        let storage = self.new_storage(&definition)?;
        let id = HolderId(self.holders.len());
        debug!("Creating holder {} for {}", id.0, variable);
        self.holders.push(Holder::new(definition, storage));
        self.index.insert(variable.to_string(), id);
        Ok(id)
    }

    fn new_storage(&mut self, variable: &Variable) -> EngineResult<Box<dyn PeriodStorage>> {
        if !self.config.storage.is_on_disk(variable.name()) {
            return Ok(Box::new(MemoryStorage::new()));
        }
        let directory = match self.directory.take() {
            Some(directory) => directory,
            None => SimulationDirectory::create(
                self.config.storage.base_dir.as_deref(),
                self.config.storage.preserve,
            )?,
        };
        let dir = directory.variable_dir(variable.name());
        self.directory = Some(directory);
        let storage = DiskStorage::create(dir, self.config.storage.preserve)?
            .with_enum_table(variable.possible_values().cloned());
        Ok(Box::new(storage))
    }

    /// Directory of on-disk holders, once one exists
    pub fn storage_directory(&self) -> Option<&std::path::Path> {
        self.directory.as_ref().map(SimulationDirectory::path)
    }

    pub(crate) fn holder(&self, id: HolderId) -> &Holder {
        &self.holders[id.0]
    }

    pub(crate) fn holder_mut(&mut self, id: HolderId) -> &mut Holder {
        &mut self.holders[id.0]
    }

    /// Population size of the variable's entity
    pub(crate) fn count_of(&self, variable: &Variable) -> EngineResult<usize> {
        Ok(self.population(variable.entity())?.count())
    }

    /// Run `body` inside a guard frame for `(variable, period)`
    ///
    /// The frame is popped on every exit path of `body`.
    pub(crate) fn guarded<T>(
        &mut self,
        variable: &str,
        period: &Period,
        body: impl FnOnce(&mut Self) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.guard.enter(variable, period)?;
        let result = body(self);
        self.guard.exit();
        result
    }

    /// Note a value `compute` stored, in case a spiral fallback taints it
    pub(crate) fn record_computed(&mut self, id: HolderId, period: Period) {
        if self.config.spiral_fallback == SpiralFallback::DefaultValue {
            self.computed.push((id, period));
        }
    }

    /// A spiral fell back to a default; values stored in this calculation
    /// may depend on it
    pub(crate) fn mark_fallback(&mut self) {
        self.fallback_used = true;
    }

    /// Forget every value computed during a calculation that used a spiral
    /// fallback. Inputs are never recorded, so they survive.
    fn purge_fallback_results(&mut self) -> EngineResult<()> {
        let computed = std::mem::take(&mut self.computed);
        if !std::mem::take(&mut self.fallback_used) {
            return Ok(());
        }
        for (id, period) in computed {
            debug!("Invalidating {}@{}", self.holders[id.0].variable().name(), period);
            self.holders[id.0].remove_array(&period)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("system", &self.system.name())
            .field("populations", &self.populations)
            .field("holders", &self.holders.len())
            .field("directory", &self.storage_directory())
            .finish()
    }
}
