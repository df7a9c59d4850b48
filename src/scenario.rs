//! Scenario runner for baseline and reform simulations
//!
//! Populations and inputs are described once by a [`SimulationBuilder`]; each
//! scenario rebuilds an independent simulation from it on its own system, so
//! scenarios run in parallel without sharing any mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::arrays::Array;
use crate::error::EngineResult;
use crate::periods::Period;
use crate::simulation::SimulationBuilder;
use crate::system::TaxBenefitSystem;

/// Values computed by one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    /// Name of the system the scenario ran on
    pub system: String,
    pub period: Period,
    pub values: BTreeMap<String, Array>,
}

impl ScenarioResult {
    /// Sum over the population of a numeric variable
    pub fn total(&self, variable: &str) -> Option<f64> {
        Some(self.values.get(variable)?.to_floats()?.iter().sum())
    }
}

/// Reform total minus baseline total for one variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioDifference {
    pub variable: String,
    pub reform: String,
    pub baseline_total: f64,
    pub reform_total: f64,
    pub difference: f64,
}

/// Pre-built simulation description reused for every scenario
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::new(builder)
///     .with_reform(demo::flat_tax_reform(&base)?);
///
/// let results = runner.run(&["income_tax"], &"2015".parse()?)?;
/// let diffs = ScenarioRunner::compare(&results);
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    builder: SimulationBuilder,
    reforms: Vec<Arc<TaxBenefitSystem>>,
}

impl ScenarioRunner {
    /// Runner whose baseline is the builder's system
    pub fn new(builder: SimulationBuilder) -> Self {
        Self {
            builder,
            reforms: Vec::new(),
        }
    }

    pub fn with_reform(mut self, reform: TaxBenefitSystem) -> Self {
        self.reforms.push(Arc::new(reform));
        self
    }

    pub fn reforms(&self) -> &[Arc<TaxBenefitSystem>] {
        &self.reforms
    }

    /// Compute `variables` for `period` on the baseline and every reform
    ///
    /// Results come back baseline first, then reforms in the order they were
    /// added. The first failing scenario's error is returned.
    pub fn run(&self, variables: &[&str], period: &Period) -> EngineResult<Vec<ScenarioResult>> {
        let mut systems = vec![Arc::clone(self.builder.system())];
        systems.extend(self.reforms.iter().cloned());
        info!(
            "Running {} scenarios for {} variables over {}",
            systems.len(),
            variables.len(),
            period
        );

        systems
            .par_iter()
            .map(|system| self.run_one(Arc::clone(system), variables, period))
            .collect()
    }

    /// Run a single scenario on `system`
    pub fn run_one(
        &self,
        system: Arc<TaxBenefitSystem>,
        variables: &[&str],
        period: &Period,
    ) -> EngineResult<ScenarioResult> {
        let name = system.name().to_string();
        let mut simulation = self.builder.clone().with_system(system).build()?;
        let mut values = BTreeMap::new();
        for variable in variables {
            values.insert(variable.to_string(), simulation.calculate(variable, period)?);
        }
        Ok(ScenarioResult {
            system: name,
            period: *period,
            values,
        })
    }

    /// Differences of every numeric variable between the first result (the
    /// baseline) and each of the others
    pub fn compare(results: &[ScenarioResult]) -> Vec<ScenarioDifference> {
        let Some((baseline, reforms)) = results.split_first() else {
            return Vec::new();
        };
        let mut differences = Vec::new();
        for reform in reforms {
            for variable in baseline.values.keys() {
                let (Some(before), Some(after)) = (baseline.total(variable), reform.total(variable)) else {
                    continue;
                };
                differences.push(ScenarioDifference {
                    variable: variable.clone(),
                    reform: reform.system.clone(),
                    baseline_total: before,
                    reform_total: after,
                    difference: after - before,
                });
            }
        }
        differences
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::demo;
    use crate::parameters::Legislation;

    fn runner() -> ScenarioRunner {
        let base = demo::tax_benefit_system().unwrap();
        let reform = demo::flat_tax_reform(&base).unwrap();
        let mut neutral = base.reform("no_basic_income");
        neutral.neutralize_variable("basic_income").unwrap();

        let builder = SimulationBuilder::new(
            Arc::new(base),
            Arc::new(Legislation::new(Arc::new(demo::parameters()))),
        )
        .persons(2)
        .group(demo::HOUSEHOLD, 1, vec![0, 0])
        .input("salary", "2016".parse().unwrap(), vec![24000.0, 12000.0])
        .input(
            "birth_date",
            Period::eternity(),
            vec![
                chrono::NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
                chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            ],
        );

        ScenarioRunner::new(builder).with_reform(reform).with_reform(neutral)
    }

    #[test]
    fn test_scenario_runner_parallel() {
        let runner = runner();
        let period: Period = "2016".parse().unwrap();
        let results = runner.run(&["income_tax", "basic_income"], &period).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].system, "demo");
        assert_eq!(results[1].system, "demo_flat_tax");
        assert_eq!(results[2].system, "no_basic_income");

        // Baseline taxes above the allowance, the flat reform taxes everything
        assert_relative_eq!(results[0].total("income_tax").unwrap(), (21000.0 + 9000.0) * 0.16);
        assert_relative_eq!(results[1].total("income_tax").unwrap(), 36000.0 * 0.16);
        assert_relative_eq!(results[2].total("basic_income").unwrap(), 0.0);

        let differences = ScenarioRunner::compare(&results);
        assert_eq!(differences.len(), 4);
        let flat_tax = differences
            .iter()
            .find(|d| d.reform == "demo_flat_tax" && d.variable == "income_tax")
            .unwrap();
        assert_relative_eq!(flat_tax.difference, 6000.0 * 0.16);
    }

    #[test]
    fn test_scenario_error_propagates() {
        let runner = runner();
        let err = runner.run(&["wage"], &"2016".parse().unwrap()).unwrap_err();
        assert!(err.to_string().contains("wage"));
    }

    #[test]
    fn test_results_serialize() {
        let runner = runner();
        let results = runner
            .run(&["salary"], &"2016-01".parse().unwrap())
            .unwrap();
        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["system"], "demo");
        assert_eq!(json["period"], "2016-01");
        assert_eq!(json["values"]["salary"], serde_json::json!([2000.0, 1000.0]));
    }
}
