//! Fiscal Engine CLI
//!
//! Computes variables of the demonstration system for a population described
//! by CSV inputs, optionally against reforms, and prints JSON results.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueHint};
use fiscal_engine::demo;
use fiscal_engine::parameters::{load_parameters, Legislation};
use fiscal_engine::simulation::{load_inputs, SimulationBuilder};
use fiscal_engine::{Period, ScenarioRunner, SimulationConfig};
use log::info;
use serde_json::json;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Compute tax and benefit variables of the demonstration system"
)]
struct Cli {
    /// Period to compute, e.g. 2015, 2015-03 or 2015-01:6
    #[arg(long)]
    period: Period,

    /// Variable to compute (repeatable)
    #[arg(short, long = "variable", required = true)]
    variables: Vec<String>,

    /// Number of persons
    #[arg(long, default_value_t = 1)]
    persons: usize,

    /// Number of households
    #[arg(long, default_value_t = 1)]
    households: usize,

    /// Household of every person, comma separated (all in household 0 when omitted)
    #[arg(long, value_delimiter = ',')]
    membership: Vec<usize>,

    /// Input CSV with columns variable,period,index,value
    #[arg(long, value_hint = ValueHint::FilePath)]
    inputs: Option<PathBuf>,

    /// Parameter CSV with columns path,start,value (built-in parameters when omitted)
    #[arg(long, value_hint = ValueHint::FilePath)]
    parameters: Option<PathBuf>,

    /// Simulation configuration JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Also run the flat income tax reform
    #[arg(long)]
    flat_tax: bool,

    /// Also run a reform neutralizing this variable (repeatable)
    #[arg(long)]
    neutralize: Vec<String>,

    /// Write the JSON report here instead of standard output
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let system = demo::tax_benefit_system().context("Unable to build the demonstration system")?;

    let parameters = match &cli.parameters {
        Some(path) => load_parameters(path)
            .map_err(|e| anyhow!("Unable to load parameters from {}: {}", path.display(), e))?,
        None => demo::parameters(),
    };
    let config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path).map_err(|e| anyhow!(e))?,
        None => SimulationConfig::default(),
    };

    let membership = if cli.membership.is_empty() {
        vec![0; cli.persons]
    } else {
        cli.membership.clone()
    };

    let mut builder = SimulationBuilder::new(
        Arc::new(system.clone()),
        Arc::new(Legislation::new(Arc::new(parameters))),
    )
    .config(config)
    .persons(cli.persons)
    .group(demo::HOUSEHOLD, cli.households, membership);
    if let Some(path) = &cli.inputs {
        let table = load_inputs(path)
            .map_err(|e| anyhow!("Unable to load inputs from {}: {}", path.display(), e))?;
        info!("Loaded {} input cells from {}", table.len(), path.display());
        builder = builder.inputs(table);
    }

    let mut runner = ScenarioRunner::new(builder);
    if cli.flat_tax {
        runner = runner.with_reform(demo::flat_tax_reform(&system)?);
    }
    for variable in &cli.neutralize {
        let mut reform = system.reform(&format!("demo_without_{}", variable));
        reform
            .neutralize_variable(variable)
            .with_context(|| format!("Unable to neutralize {}", variable))?;
        runner = runner.with_reform(reform);
    }

    let variables: Vec<&str> = cli.variables.iter().map(String::as_str).collect();
    let results = runner
        .run(&variables, &cli.period)
        .with_context(|| format!("Calculation failed for {}", cli.period))?;

    let report = if results.len() > 1 {
        json!({
            "results": results,
            "differences": ScenarioRunner::compare(&results),
        })
    } else {
        json!({ "results": results })
    };
    let text = serde_json::to_string_pretty(&report)?;

    match &cli.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Unable to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
