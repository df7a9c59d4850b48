//! CSV-based parameter loader
//!
//! One row per change of value:
//!
//! ```text
//! path,start,value
//! taxes.income_tax_rate,2013-01-01,0.15
//! taxes.income_tax_rate,2015-01-01,0.16
//! benefits.housing_allowance_rate,2010-01-01,0.25
//! benefits.housing_allowance_rate,2016-12-01,
//! ```
//!
//! An empty value ends the parameter: it has no value from that date on.

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

use csv::Reader;

use super::{ParameterNode, ParameterProvider};
use crate::periods::Instant;

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    path: String,
    start: String,
    value: Option<f64>,
}

/// Dated values of every parameter, sorted by start instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterHistory {
    values: BTreeMap<String, Vec<(Instant, Option<f64>)>>,
}

impl ParameterHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` takes `value` from `start` on (`None` ends it)
    pub fn set(&mut self, path: &str, start: Instant, value: Option<f64>) {
        let history = self.values.entry(path.to_string()).or_default();
        match history.binary_search_by_key(&start, |(instant, _)| *instant) {
            Ok(i) => history[i].1 = value,
            Err(i) => history.insert(i, (start, value)),
        }
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, path: &str, start: Instant, value: f64) -> Self {
        self.set(path, start, Some(value));
        self
    }

    /// Value in force at `instant`; `None` before the first value or after an end
    pub fn value_at(&self, path: &str, instant: Instant) -> Option<f64> {
        let history = self.values.get(path)?;
        history
            .iter()
            .rev()
            .find(|(start, _)| *start <= instant)
            .and_then(|(_, value)| *value)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterProvider for ParameterHistory {
    fn legislation_at(&self, instant: Instant) -> ParameterNode {
        let mut root = ParameterNode::default();
        for path in self.values.keys() {
            if let Some(value) = self.value_at(path, instant) {
                root.insert(path, value);
            }
        }
        root
    }
}

/// Load parameters from a CSV file
pub fn load_parameters<P: AsRef<Path>>(path: P) -> Result<ParameterHistory, Box<dyn Error + Send + Sync>> {
    let reader = Reader::from_path(path)?;
    read_rows(reader)
}

/// Load parameters from any reader (e.g., string buffer)
pub fn load_parameters_from_reader<R: std::io::Read>(
    reader: R,
) -> Result<ParameterHistory, Box<dyn Error + Send + Sync>> {
    read_rows(Reader::from_reader(reader))
}

fn read_rows<R: std::io::Read>(mut reader: Reader<R>) -> Result<ParameterHistory, Box<dyn Error + Send + Sync>> {
    let mut history = ParameterHistory::new();

    for result in reader.deserialize() {
        let row: CsvRow = result?;
        let start: Instant = row.start.trim().parse()?;
        let path = row.path.trim();
        if path.is_empty() {
            return Err("Parameter path cannot be empty".into());
        }
        history.set(path, start, row.value);
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> Instant {
        s.parse().unwrap()
    }

    const PARAMETERS: &str = "\
path,start,value
taxes.income_tax_rate,2013-01-01,0.15
taxes.income_tax_rate,2015-01-01,0.16
benefits.housing_allowance_rate,2010-01-01,0.25
benefits.housing_allowance_rate,2016-12-01,
";

    #[test]
    fn test_load_from_reader() {
        let history = load_parameters_from_reader(PARAMETERS.as_bytes()).unwrap();
        assert_eq!(history.len(), 2);

        assert_eq!(history.value_at("taxes.income_tax_rate", at("2012-12-31")), None);
        assert_eq!(history.value_at("taxes.income_tax_rate", at("2014-06-01")), Some(0.15));
        assert_eq!(history.value_at("taxes.income_tax_rate", at("2015-01-01")), Some(0.16));

        assert_eq!(history.value_at("benefits.housing_allowance_rate", at("2016-11-30")), Some(0.25));
        assert_eq!(history.value_at("benefits.housing_allowance_rate", at("2016-12-01")), None);
    }

    #[test]
    fn test_legislation_at_builds_tree() {
        let history = load_parameters_from_reader(PARAMETERS.as_bytes()).unwrap();
        let tree = history.legislation_at(at("2017-01-01"));
        assert_eq!(tree.value("taxes.income_tax_rate"), Some(0.16));
        assert!(tree.get("benefits").is_none());
    }

    #[test]
    fn test_bad_rows_fail() {
        let bad_date = "path,start,value\ntaxes.rate,2014-13-01,0.1\n";
        assert!(load_parameters_from_reader(bad_date.as_bytes()).is_err());

        let bad_value = "path,start,value\ntaxes.rate,2014-01-01,abc\n";
        assert!(load_parameters_from_reader(bad_value.as_bytes()).is_err());
    }

    #[test]
    fn test_set_replaces_same_start() {
        let mut history = ParameterHistory::new();
        history.set("x", at("2014-01-01"), Some(1.0));
        history.set("x", at("2014-01-01"), Some(2.0));
        assert_eq!(history.value_at("x", at("2014-02-01")), Some(2.0));
    }
}
