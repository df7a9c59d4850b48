//! Typed value arrays, one cell per member of a population
//!
//! Every holder stores [`Array`]s whose length equals the population count and
//! whose [`ValueType`] equals the variable's declared type. Enumerated
//! variables store integer codes alongside a shared [`EnumTable`] of labels.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

/// Declared type of a variable's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float,
    Int,
    Bool,
    Date,
    Enum,
}

impl ValueType {
    /// Whether values of this type can be summed and divided
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Float | ValueType::Int)
    }

    /// Size in bytes of one cell
    pub fn cell_size(&self) -> usize {
        match self {
            ValueType::Float => std::mem::size_of::<f64>(),
            ValueType::Int => std::mem::size_of::<i64>(),
            ValueType::Bool => std::mem::size_of::<bool>(),
            ValueType::Date => std::mem::size_of::<NaiveDate>(),
            ValueType::Enum => std::mem::size_of::<u16>(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::Date => "date",
            ValueType::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// A single scalar, used for declared defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
    Date(NaiveDate),
    /// Code into the variable's enum table
    Enum(u16),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Float(_) => ValueType::Float,
            Value::Int(_) => ValueType::Int,
            Value::Bool(_) => ValueType::Bool,
            Value::Date(_) => ValueType::Date,
            Value::Enum(_) => ValueType::Enum,
        }
    }
}

/// Category labels of an enumerated variable; a code is an index into `labels`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTable {
    pub name: String,
    pub labels: Vec<String>,
}

impl EnumTable {
    pub fn new(name: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn code_of(&self, label: &str) -> Option<u16> {
        self.labels
            .iter()
            .position(|l| l == label)
            .and_then(|i| u16::try_from(i).ok())
    }

    pub fn label(&self, code: u16) -> Option<&str> {
        self.labels.get(usize::from(code)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Enum codes plus the table giving them meaning
#[derive(Debug, Clone)]
pub struct EnumArray {
    pub codes: Vec<u16>,
    pub table: Arc<EnumTable>,
}

impl EnumArray {
    pub fn new(codes: Vec<u16>, table: Arc<EnumTable>) -> Self {
        Self { codes, table }
    }

    /// Build from labels; `None` if a label is not in the table
    pub fn from_labels(labels: &[&str], table: Arc<EnumTable>) -> Option<Self> {
        let codes = labels
            .iter()
            .map(|label| table.code_of(label))
            .collect::<Option<Vec<u16>>>()?;
        Some(Self { codes, table })
    }

    /// Labels of every cell; unknown codes render as `"?"`
    pub fn labels(&self) -> Vec<&str> {
        self.codes
            .iter()
            .map(|&code| self.table.label(code).unwrap_or("?"))
            .collect()
    }
}

impl PartialEq for EnumArray {
    fn eq(&self, other: &Self) -> bool {
        self.codes == other.codes && *self.table == *other.table
    }
}

/// Column of values for a population
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Date(Vec<NaiveDate>),
    Enum(EnumArray),
}

impl Array {
    /// Broadcast `value` to `len` cells
    ///
    /// Enum values need the table of the variable they belong to.
    pub fn filled(value: &Value, len: usize, table: Option<&Arc<EnumTable>>) -> Array {
        match value {
            Value::Float(v) => Array::Float(vec![*v; len]),
            Value::Int(v) => Array::Int(vec![*v; len]),
            Value::Bool(v) => Array::Bool(vec![*v; len]),
            Value::Date(v) => Array::Date(vec![*v; len]),
            Value::Enum(code) => Array::Enum(EnumArray::new(
                vec![*code; len],
                table.cloned().unwrap_or_default(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Array::Float(v) => v.len(),
            Array::Int(v) => v.len(),
            Array::Bool(v) => v.len(),
            Array::Date(v) => v.len(),
            Array::Enum(e) => e.codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Array::Float(_) => ValueType::Float,
            Array::Int(_) => ValueType::Int,
            Array::Bool(_) => ValueType::Bool,
            Array::Date(_) => ValueType::Date,
            Array::Enum(_) => ValueType::Enum,
        }
    }

    /// Bytes used by the cells
    pub fn nbytes(&self) -> usize {
        self.len() * self.value_type().cell_size()
    }

    /// Convert to `target` when the types are compatible
    ///
    /// Numbers and booleans convert between each other (floats truncate
    /// toward zero when narrowed to integers). Dates and enums only convert to
    /// themselves.
    pub fn cast(self, target: ValueType) -> Option<Array> {
        if self.value_type() == target {
            return Some(self);
        }
        match (self, target) {
            (Array::Int(v), ValueType::Float) => Some(Array::Float(v.into_iter().map(|x| x as f64).collect())),
            (Array::Float(v), ValueType::Int) => Some(Array::Int(v.into_iter().map(|x| x as i64).collect())),
            (Array::Bool(v), ValueType::Float) => {
                Some(Array::Float(v.into_iter().map(|x| if x { 1.0 } else { 0.0 }).collect()))
            }
            (Array::Bool(v), ValueType::Int) => Some(Array::Int(v.into_iter().map(i64::from).collect())),
            (Array::Int(v), ValueType::Bool) => Some(Array::Bool(v.into_iter().map(|x| x != 0).collect())),
            (Array::Float(v), ValueType::Bool) => Some(Array::Bool(v.into_iter().map(|x| x != 0.0).collect())),
            _ => None,
        }
    }

    /// Element-wise sum of two numeric arrays of the same type and length;
    /// `None` on integer overflow
    pub fn checked_add(&self, other: &Array) -> Option<Array> {
        match (self, other) {
            (Array::Float(a), Array::Float(b)) if a.len() == b.len() => {
                Some(Array::Float(a.iter().zip(b).map(|(x, y)| x + y).collect()))
            }
            (Array::Int(a), Array::Int(b)) if a.len() == b.len() => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.checked_add(*y))
                .collect::<Option<Vec<_>>>()
                .map(Array::Int),
            _ => None,
        }
    }

    /// Element-wise difference of two numeric arrays of the same type and length
    pub fn checked_sub(&self, other: &Array) -> Option<Array> {
        match (self, other) {
            (Array::Float(a), Array::Float(b)) if a.len() == b.len() => {
                Some(Array::Float(a.iter().zip(b).map(|(x, y)| x - y).collect()))
            }
            (Array::Int(a), Array::Int(b)) if a.len() == b.len() => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.checked_sub(*y))
                .collect::<Option<Vec<_>>>()
                .map(Array::Int),
            _ => None,
        }
    }

    /// Divide every cell by `divisor`; integer cells use integer division
    pub fn divided_by(&self, divisor: u32) -> Option<Array> {
        if divisor == 0 {
            return None;
        }
        match self {
            Array::Float(v) => Some(Array::Float(v.iter().map(|x| x / f64::from(divisor)).collect())),
            Array::Int(v) => Some(Array::Int(v.iter().map(|x| x / i64::from(divisor)).collect())),
            _ => None,
        }
    }

    /// Whether every cell of a numeric array is zero
    pub fn is_all_zero(&self) -> bool {
        match self {
            Array::Float(v) => v.iter().all(|x| *x == 0.0),
            Array::Int(v) => v.iter().all(|x| *x == 0),
            _ => false,
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Array::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            Array::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Array::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&[NaiveDate]> {
        match self {
            Array::Date(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumArray> {
        match self {
            Array::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Numeric view as floats (ints and bools are widened)
    pub fn to_floats(&self) -> Option<Vec<f64>> {
        match self.clone().cast(ValueType::Float)? {
            Array::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Vec<f64>> for Array {
    fn from(v: Vec<f64>) -> Self {
        Array::Float(v)
    }
}

impl From<Vec<i64>> for Array {
    fn from(v: Vec<i64>) -> Self {
        Array::Int(v)
    }
}

impl From<Vec<bool>> for Array {
    fn from(v: Vec<bool>) -> Self {
        Array::Bool(v)
    }
}

impl From<Vec<NaiveDate>> for Array {
    fn from(v: Vec<NaiveDate>) -> Self {
        Array::Date(v)
    }
}

impl Serialize for Array {
    /// Plain JSON list; enum cells are written as labels
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        match self {
            Array::Float(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            Array::Int(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            Array::Bool(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            Array::Date(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            Array::Enum(e) => e.labels().iter().try_for_each(|x| seq.serialize_element(x))?,
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn housing() -> Arc<EnumTable> {
        Arc::new(EnumTable::new("housing", &["owner", "tenant", "free_lodger"]))
    }

    #[test]
    fn test_filled() {
        let a = Array::filled(&Value::Float(2.5), 3, None);
        assert_eq!(a, Array::Float(vec![2.5, 2.5, 2.5]));

        let table = housing();
        let e = Array::filled(&Value::Enum(1), 2, Some(&table));
        assert_eq!(e.as_enum().unwrap().labels(), vec!["tenant", "tenant"]);
    }

    #[test]
    fn test_cast() {
        let ints = Array::Int(vec![1, 2, 3]);
        assert_eq!(ints.cast(ValueType::Float), Some(Array::Float(vec![1.0, 2.0, 3.0])));

        let floats = Array::Float(vec![1.9, -1.9]);
        assert_eq!(floats.cast(ValueType::Int), Some(Array::Int(vec![1, -1])));

        let bools = Array::Bool(vec![true, false]);
        assert_eq!(bools.cast(ValueType::Int), Some(Array::Int(vec![1, 0])));

        let dates = Array::Date(vec![NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()]);
        assert!(dates.cast(ValueType::Float).is_none());
    }

    #[test]
    fn test_arithmetic() {
        let a = Array::Float(vec![1.0, 2.0]);
        let b = Array::Float(vec![10.0, 20.0]);
        assert_eq!(a.checked_add(&b), Some(Array::Float(vec![11.0, 22.0])));
        assert_eq!(b.checked_sub(&a), Some(Array::Float(vec![9.0, 18.0])));
        assert_eq!(b.divided_by(4), Some(Array::Float(vec![2.5, 5.0])));
        assert_eq!(Array::Int(vec![7]).divided_by(2), Some(Array::Int(vec![3])));

        assert!(a.checked_add(&Array::Int(vec![1, 2])).is_none());
        assert!(a.checked_add(&Array::Float(vec![1.0])).is_none());
        assert!(a.divided_by(0).is_none());
        assert!(Array::Float(vec![0.0, 0.0]).is_all_zero());
    }

    #[test]
    fn test_integer_overflow_is_none() {
        let big = Array::Int(vec![1, i64::MAX]);
        let one = Array::Int(vec![1, 1]);
        assert!(big.checked_add(&one).is_none());
        assert!(Array::Int(vec![i64::MIN]).checked_sub(&Array::Int(vec![1])).is_none());
        assert_eq!(one.checked_add(&one), Some(Array::Int(vec![2, 2])));
        assert_eq!(one.checked_sub(&one), Some(Array::Int(vec![0, 0])));
    }

    #[test]
    fn test_enum_labels() {
        let table = housing();
        let e = EnumArray::from_labels(&["owner", "free_lodger"], Arc::clone(&table)).unwrap();
        assert_eq!(e.codes, vec![0, 2]);
        assert!(EnumArray::from_labels(&["castle"], table).is_none());
    }

    #[test]
    fn test_serialize_enum_as_labels() {
        let e = Array::Enum(EnumArray::new(vec![0, 1], housing()));
        assert_eq!(serde_json::to_string(&e).unwrap(), r#"["owner","tenant"]"#);
        assert_eq!(serde_json::to_string(&Array::Int(vec![1, 2])).unwrap(), "[1,2]");
    }

    #[test]
    fn test_nbytes() {
        assert_eq!(Array::Float(vec![0.0; 4]).nbytes(), 32);
        assert_eq!(Array::Bool(vec![true; 4]).nbytes(), 4);
    }
}
