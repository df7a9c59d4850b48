//! Simulation inputs from CSV and a builder assembling simulations
//!
//! Input files have one row per cell:
//!
//! ```text
//! variable,period,index,value
//! salary,2014-03,0,1000
//! salary,2014,1,24000
//! birth_date,eternity,0,1980-06-15
//! housing_occupancy_status,2014-01,0,owner
//! ```
//!
//! Cells of a `(variable, period)` pair that no row mentions take the
//! variable's default. Pairs are applied in the order they first appear.

use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use csv::Reader;
use log::info;
use serde::Deserialize;

use super::Simulation;
use crate::arrays::Array;
use crate::config::SimulationConfig;
use crate::error::{EngineError, EngineResult};
use crate::parameters::Legislation;
use crate::periods::Period;
use crate::system::TaxBenefitSystem;

/// One input cell
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputRow {
    pub variable: String,
    pub period: Period,
    pub index: usize,
    pub value: String,
}

/// Input cells, not yet checked against any system
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    rows: Vec<InputRow>,
}

impl InputTable {
    pub fn new(rows: Vec<InputRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[InputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build one array per `(variable, period)` and give it to the simulation
    pub fn apply(&self, simulation: &mut Simulation) -> EngineResult<()> {
        let mut order: Vec<(String, Period)> = Vec::new();
        let mut cells: HashMap<(String, Period), Vec<&InputRow>> = HashMap::new();
        for row in &self.rows {
            let key = (row.variable.clone(), row.period);
            cells
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(row);
        }

        for key in order {
            let rows = cells.remove(&key).unwrap_or_default();
            let (variable, period) = key;
            let definition = Arc::clone(simulation.system().get_variable(&variable)?);
            let count = simulation.count_of(&definition)?;

            let mut array = definition.default_array(count);
            for row in rows {
                if row.index >= count {
                    return Err(EngineError::InvalidInput {
                        variable: variable.clone(),
                        reason: format!("index {} is out of a population of {}", row.index, count),
                    });
                }
                set_cell(&mut array, row.index, row.value.trim()).map_err(|reason| EngineError::InvalidInput {
                    variable: variable.clone(),
                    reason,
                })?;
            }
            simulation.set_input(&variable, &period, array)?;
        }
        Ok(())
    }
}

fn set_cell(array: &mut Array, index: usize, raw: &str) -> Result<(), String> {
    match array {
        Array::Float(values) => {
            values[index] = raw.parse().map_err(|_| format!("'{}' is not a number", raw))?;
        }
        Array::Int(values) => {
            values[index] = raw.parse().map_err(|_| format!("'{}' is not an integer", raw))?;
        }
        Array::Bool(values) => {
            values[index] = match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(format!("'{}' is not a boolean", raw)),
            };
        }
        Array::Date(values) => {
            values[index] = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| format!("'{}' is not a YYYY-MM-DD date", raw))?;
        }
        Array::Enum(values) => {
            values.codes[index] = values
                .table
                .code_of(raw)
                .ok_or_else(|| format!("'{}' is not one of {:?}", raw, values.table.labels))?;
        }
    }
    Ok(())
}

/// Load inputs from a CSV file
pub fn load_inputs<P: AsRef<Path>>(path: P) -> Result<InputTable, Box<dyn Error + Send + Sync>> {
    let reader = Reader::from_path(path)?;
    read_rows(reader)
}

/// Load inputs from any reader (e.g., string buffer)
pub fn load_inputs_from_reader<R: std::io::Read>(reader: R) -> Result<InputTable, Box<dyn Error + Send + Sync>> {
    read_rows(Reader::from_reader(reader))
}

fn read_rows<R: std::io::Read>(mut reader: Reader<R>) -> Result<InputTable, Box<dyn Error + Send + Sync>> {
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: InputRow = result?;
        rows.push(row);
    }
    Ok(InputTable::new(rows))
}

/// Assembles a simulation: populations first, then inputs
#[derive(Debug, Clone)]
pub struct SimulationBuilder {
    system: Arc<TaxBenefitSystem>,
    legislation: Arc<Legislation>,
    config: SimulationConfig,
    persons: usize,
    groups: Vec<(String, usize, Vec<usize>)>,
    tables: Vec<InputTable>,
    arrays: Vec<(String, Period, Array)>,
}

impl SimulationBuilder {
    pub fn new(system: Arc<TaxBenefitSystem>, legislation: Arc<Legislation>) -> Self {
        Self {
            system,
            legislation,
            config: SimulationConfig::default(),
            persons: 1,
            groups: Vec::new(),
            tables: Vec::new(),
            arrays: Vec::new(),
        }
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Same populations and inputs on another system (a reform)
    pub fn with_system(mut self, system: Arc<TaxBenefitSystem>) -> Self {
        self.system = system;
        self
    }

    pub fn persons(mut self, count: usize) -> Self {
        self.persons = count;
        self
    }

    /// Group population; `membership[i]` is the group of person `i`
    pub fn group(mut self, entity: &str, count: usize, membership: Vec<usize>) -> Self {
        self.groups.push((entity.to_string(), count, membership));
        self
    }

    pub fn inputs(mut self, table: InputTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Input applied after the tables
    pub fn input(mut self, variable: &str, period: Period, array: impl Into<Array>) -> Self {
        self.arrays.push((variable.to_string(), period, array.into()));
        self
    }

    pub fn system(&self) -> &Arc<TaxBenefitSystem> {
        &self.system
    }

    pub fn build(self) -> EngineResult<Simulation> {
        let mut simulation = Simulation::new(self.system, self.legislation, self.config);
        simulation.add_person_population(self.persons)?;
        for (entity, count, membership) in self.groups {
            simulation.add_group_population(&entity, count, membership)?;
        }
        for table in &self.tables {
            table.apply(&mut simulation)?;
        }
        for (variable, period, array) in self.arrays {
            simulation.set_input(&variable, &period, array)?;
        }
        info!(
            "Built simulation of {} with {} persons and {} input tables",
            simulation.system().name(),
            self.persons,
            self.tables.len()
        );
        Ok(simulation)
    }
}
