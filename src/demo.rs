//! Small demonstration system used by the command line and the tests
//!
//! Persons earn a monthly salary, pay a yearly income tax and may receive a
//! basic income; households pay rent and may receive a housing allowance.
//! The rules are invented and only meant to exercise every base function.

use std::sync::{Arc, OnceLock};

use chrono::{Datelike, NaiveDate};

use crate::arrays::{Array, EnumTable, Value, ValueType};
use crate::error::{EngineError, EngineResult};
use crate::parameters::{Legislation, ParameterHistory};
use crate::periods::{DateUnit, Instant, Period};
use crate::simulation::{Operand, PopulationView};
use crate::system::{Entity, TaxBenefitSystem};
use crate::variables::{BaseFunction, SetInputPolicy, Variable};

pub const PERSON: &str = "person";
pub const HOUSEHOLD: &str = "household";

/// Labels of `housing_occupancy_status`
pub fn housing_occupancy_statuses() -> Arc<EnumTable> {
    static TABLE: OnceLock<Arc<EnumTable>> = OnceLock::new();
    Arc::clone(TABLE.get_or_init(|| {
        Arc::new(EnumTable::new(
            "housing_occupancy_status",
            &["owner", "tenant", "free_lodger", "homeless"],
        ))
    }))
}

const TENANT: u16 = 1;

/// Parameter history matching the formulas below
pub fn parameters() -> ParameterHistory {
    ParameterHistory::new()
        .with("taxes.income_tax_rate", jan_first(2013), 0.15)
        .with("taxes.income_tax_rate", jan_first(2015), 0.16)
        .with("taxes.personal_allowance", jan_first(2015), 3000.0)
        .with("benefits.basic_income", jan_first(2016), 600.0)
        .with("benefits.basic_income_age", jan_first(2016), 18.0)
        .with("benefits.housing_allowance_share", jan_first(2013), 0.25)
}

fn jan_first(year: i32) -> Instant {
    Instant::from_date(NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default())
}

/// Persons and households with the demonstration variables
pub fn tax_benefit_system() -> EngineResult<TaxBenefitSystem> {
    let mut system = TaxBenefitSystem::new("demo");
    system.add_entity(Entity::person(PERSON, "persons"))?;
    system.add_entity(Entity::group(HOUSEHOLD, "households"))?;

    system.add_variable(
        Variable::builder("salary", PERSON, ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue)
            .set_input(SetInputPolicy::DivideByPeriod)
            .label("Gross salary")
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("birth_date", PERSON, ValueType::Date, DateUnit::Eternity)
            .label("Date of birth")
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("age", PERSON, ValueType::Int, DateUnit::Month)
            .formula(age)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("is_employed", PERSON, ValueType::Bool, DateUnit::Month)
            .base_function(BaseFunction::FirstSubPeriodValue)
            .set_input(SetInputPolicy::DispatchByPeriod)
            .formula(is_employed)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("income_tax", PERSON, ValueType::Float, DateUnit::Year)
            .set_input(SetInputPolicy::DivideByPeriod)
            .formula_since(Instant::new(2013, 1, 1)?, flat_income_tax)
            .formula_since(Instant::new(2015, 1, 1)?, income_tax_with_allowance)
            .label("Income tax")
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("basic_income", PERSON, ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue)
            .formula_since(Instant::new(2016, 1, 1)?, basic_income)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("lives_in_rented_home", PERSON, ValueType::Bool, DateUnit::Month)
            .formula(lives_in_rented_home)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("disposable_income", PERSON, ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue)
            .formula(disposable_income)
            .build()?,
    )?;

    system.add_variable(
        Variable::builder("housing_occupancy_status", HOUSEHOLD, ValueType::Enum, DateUnit::Month)
            .period_size_independent()
            .possible_values(housing_occupancy_statuses())
            .default_value(Value::Enum(TENANT))
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("rent", HOUSEHOLD, ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue)
            .set_input(SetInputPolicy::DivideByPeriod)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("household_salary", HOUSEHOLD, ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue)
            .formula(household_salary)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("has_employed_member", HOUSEHOLD, ValueType::Bool, DateUnit::Month)
            .formula(has_employed_member)
            .build()?,
    )?;
    system.add_variable(
        Variable::builder("housing_allowance", HOUSEHOLD, ValueType::Float, DateUnit::Month)
            .base_function(BaseFunction::AddedValue)
            .formula_since(Instant::new(2013, 1, 1)?, housing_allowance)
            .build()?,
    )?;

    Ok(system)
}

/// Reform taxing every salary at a single rate with no allowance
pub fn flat_tax_reform(base: &TaxBenefitSystem) -> EngineResult<TaxBenefitSystem> {
    let mut reform = base.reform("demo_flat_tax");
    reform.replace_variable(
        Variable::builder("income_tax", PERSON, ValueType::Float, DateUnit::Year)
            .set_input(SetInputPolicy::DivideByPeriod)
            .formula(flat_income_tax)
            .label("Income tax (flat)")
            .build()?,
    )?;
    Ok(reform)
}

fn floats(array: Array, variable: &str) -> EngineResult<Vec<f64>> {
    array
        .to_floats()
        .ok_or_else(|| EngineError::formula(format!("{} is not numeric", variable)))
}

fn age(view: &mut PopulationView<'_>, period: &Period, _: &Legislation) -> EngineResult<Array> {
    let birth = view.calculate("birth_date", &Period::eternity())?;
    let dates = birth
        .as_date()
        .ok_or_else(|| EngineError::formula("birth_date is not a date"))?;
    let on = period.start().date();
    let ages = dates
        .iter()
        .map(|born| {
            let before_birthday = (on.month(), on.day()) < (born.month(), born.day());
            i64::from(on.year() - born.year()) - i64::from(before_birthday)
        })
        .collect();
    Ok(Array::Int(ages))
}

fn is_employed(view: &mut PopulationView<'_>, period: &Period, _: &Legislation) -> EngineResult<Array> {
    let salary = view.floats("salary", period)?;
    Ok(Array::Bool(salary.iter().map(|s| *s > 0.0).collect()))
}

fn flat_income_tax(view: &mut PopulationView<'_>, period: &Period, legislation: &Legislation) -> EngineResult<Array> {
    let rate = legislation.value("taxes.income_tax_rate", period.start())?;
    let salary = floats(view.calculate_add("salary", period)?, "salary")?;
    Ok(Array::Float(salary.iter().map(|s| s * rate).collect()))
}

fn income_tax_with_allowance(
    view: &mut PopulationView<'_>,
    period: &Period,
    legislation: &Legislation,
) -> EngineResult<Array> {
    let parameters = legislation.at(period.start());
    let rate = parameters.value("taxes.income_tax_rate")?;
    let allowance = parameters.value("taxes.personal_allowance")?;
    let salary = floats(view.calculate_add("salary", period)?, "salary")?;
    Ok(Array::Float(
        salary.iter().map(|s| (s - allowance).max(0.0) * rate).collect(),
    ))
}

fn basic_income(view: &mut PopulationView<'_>, period: &Period, legislation: &Legislation) -> EngineResult<Array> {
    let parameters = legislation.at(period.start());
    let amount = parameters.value("benefits.basic_income")?;
    let minimum_age = parameters.value("benefits.basic_income_age")?;
    let ages = view.floats("age", period)?;
    Ok(Array::Float(
        ages.iter()
            .map(|age| if *age >= minimum_age { amount } else { 0.0 })
            .collect(),
    ))
}

fn lives_in_rented_home(view: &mut PopulationView<'_>, period: &Period, _: &Legislation) -> EngineResult<Array> {
    let status = view.project_from_group(HOUSEHOLD, "housing_occupancy_status", period)?;
    let codes = status
        .as_enum()
        .ok_or_else(|| EngineError::formula("housing_occupancy_status is not an enum"))?;
    Ok(Array::Bool(codes.codes.iter().map(|code| *code == TENANT).collect()))
}

fn disposable_income(view: &mut PopulationView<'_>, period: &Period, _: &Legislation) -> EngineResult<Array> {
    let salary = view.floats("salary", period)?;
    let benefit = view.floats("basic_income", period)?;
    let tax = floats(view.calculate_divide("income_tax", period)?, "income_tax")?;
    Ok(Array::Float(
        salary
            .iter()
            .zip(&benefit)
            .zip(&tax)
            .map(|((s, b), t)| s + b - t)
            .collect(),
    ))
}

fn household_salary(view: &mut PopulationView<'_>, period: &Period, _: &Legislation) -> EngineResult<Array> {
    view.sum_members("salary", period)
}

fn has_employed_member(view: &mut PopulationView<'_>, period: &Period, _: &Legislation) -> EngineResult<Array> {
    view.any_member("is_employed", period)
}

fn housing_allowance(view: &mut PopulationView<'_>, period: &Period, legislation: &Legislation) -> EngineResult<Array> {
    let share = legislation.value("benefits.housing_allowance_share", period.start())?;
    let rent = floats(view.resolve(Operand::from("rent"), period)?, "rent")?;
    let income = floats(view.resolve(Operand::from("household_salary"), period)?, "household_salary")?;
    let status = view.calculate("housing_occupancy_status", period)?;
    let tenants = status
        .as_enum()
        .ok_or_else(|| EngineError::formula("housing_occupancy_status is not an enum"))?;
    Ok(Array::Float(
        rent.iter()
            .zip(&income)
            .zip(&tenants.codes)
            .map(|((rent, income), code)| {
                if *code == TENANT {
                    (rent - share * income).max(0.0)
                } else {
                    0.0
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::arrays::EnumArray;
    use crate::config::SimulationConfig;
    use crate::simulation::Simulation;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn simulation() -> Simulation {
        let mut simulation = Simulation::new(
            Arc::new(tax_benefit_system().unwrap()),
            Arc::new(Legislation::new(Arc::new(parameters()))),
            SimulationConfig::default(),
        );
        simulation.add_person_population(3).unwrap();
        simulation.add_group_population(HOUSEHOLD, 2, vec![0, 0, 1]).unwrap();
        simulation
            .set_input(
                "birth_date",
                &Period::eternity(),
                vec![
                    NaiveDate::from_ymd_opt(1980, 6, 15).unwrap(),
                    NaiveDate::from_ymd_opt(2000, 3, 1).unwrap(),
                    NaiveDate::from_ymd_opt(1950, 1, 1).unwrap(),
                ],
            )
            .unwrap();
        simulation
    }

    #[test]
    fn test_system_registers_every_variable() {
        let system = tax_benefit_system().unwrap();
        assert_eq!(system.len(), 13);
        assert!(system.get_variable("housing_allowance").unwrap().has_formula());
        assert!(!system.get_variable("salary").unwrap().has_formula());
    }

    #[test]
    fn test_age_from_permanent_birth_date() {
        let mut simulation = simulation();
        let ages = simulation.calculate("age", &p("2016-03")).unwrap();
        assert_eq!(ages, Array::Int(vec![35, 16, 66]));
    }

    #[test]
    fn test_income_tax_dated_formulas() {
        let mut simulation = simulation();
        simulation
            .set_input("salary", &p("2014"), vec![12000.0, 0.0, 6000.0])
            .unwrap();
        simulation
            .set_input("salary", &p("2015"), vec![12000.0, 0.0, 6000.0])
            .unwrap();

        let tax_2014 = simulation.calculate("income_tax", &p("2014")).unwrap();
        let tax_2014 = tax_2014.as_float().unwrap();
        assert_relative_eq!(tax_2014[0], 1800.0);
        assert_relative_eq!(tax_2014[2], 900.0);

        let tax_2015 = simulation.calculate("income_tax", &p("2015")).unwrap();
        let tax_2015 = tax_2015.as_float().unwrap();
        assert_relative_eq!(tax_2015[0], 9000.0 * 0.16);
        assert_relative_eq!(tax_2015[1], 0.0);

        // Before the first formula the default applies
        let tax_2012 = simulation.calculate("income_tax", &p("2012")).unwrap();
        assert_eq!(tax_2012, Array::Float(vec![0.0; 3]));
    }

    #[test]
    fn test_basic_income_window_and_disposable_income() {
        let mut simulation = simulation();
        simulation
            .set_input("salary", &p("2016"), vec![24000.0, 0.0, 0.0])
            .unwrap();

        let before = simulation.calculate("basic_income", &p("2015-12")).unwrap();
        assert_eq!(before, Array::Float(vec![0.0; 3]));

        let yearly = simulation.calculate("basic_income", &p("2016")).unwrap();
        let yearly = yearly.as_float().unwrap();
        assert_relative_eq!(yearly[0], 7200.0);
        // Turns 18 in 2018 only
        assert_relative_eq!(yearly[1], 0.0);

        let income = simulation.calculate("disposable_income", &p("2016-01")).unwrap();
        let income = income.as_float().unwrap();
        let tax = (24000.0 - 3000.0) * 0.16 / 12.0;
        assert_relative_eq!(income[0], 2000.0 + 600.0 - tax);
        assert_relative_eq!(income[2], 600.0);
    }

    #[test]
    fn test_household_formulas() {
        let mut simulation = simulation();
        simulation
            .set_input("salary", &p("2014-01"), vec![1000.0, 200.0, 0.0])
            .unwrap();
        simulation
            .set_input("rent", &p("2014-01"), vec![500.0, 400.0])
            .unwrap();
        let status = EnumArray::from_labels(&["tenant", "owner"], housing_occupancy_statuses()).unwrap();
        simulation
            .set_input("housing_occupancy_status", &p("2013-06"), Array::Enum(status))
            .unwrap();

        let salary = simulation.calculate("household_salary", &p("2014-01")).unwrap();
        assert_eq!(salary, Array::Float(vec![1200.0, 0.0]));

        let employed = simulation.calculate("has_employed_member", &p("2014-01")).unwrap();
        assert_eq!(employed, Array::Bool(vec![true, false]));

        let allowance = simulation.calculate("housing_allowance", &p("2014-01")).unwrap();
        let allowance = allowance.as_float().unwrap();
        assert_relative_eq!(allowance[0], 500.0 - 0.25 * 1200.0);
        assert_relative_eq!(allowance[1], 0.0);

        let rented = simulation.calculate("lives_in_rented_home", &p("2014-01")).unwrap();
        assert_eq!(rented, Array::Bool(vec![true, true, false]));
    }

    #[test]
    fn test_first_sub_period_value() {
        let mut simulation = simulation();
        simulation
            .set_input("salary", &p("2014-01"), vec![1000.0, 0.0, 0.0])
            .unwrap();
        simulation
            .set_input("salary", &p("2014-02"), vec![0.0, 1000.0, 0.0])
            .unwrap();

        let employed = simulation.calculate("is_employed", &p("2014")).unwrap();
        assert_eq!(employed, Array::Bool(vec![true, false, false]));
    }

    #[test]
    fn test_flat_tax_reform() {
        let base = tax_benefit_system().unwrap();
        let reform = flat_tax_reform(&base).unwrap();
        assert_eq!(reform.name(), "demo_flat_tax");
        assert_eq!(reform.get_variable("income_tax").unwrap().formulas().len(), 1);
        assert_eq!(base.get_variable("income_tax").unwrap().formulas().len(), 2);
    }
}
