//! Typed values and data rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single typed value. The variant is the value's logical type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns whether this is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer, converting exact decimals and
    /// numeric text.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Decimal(d) if d.fract().is_zero() => d.to_string().parse().ok(),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Returns the value as a boolean, accepting `Y`/`N` and `0`/`1` forms.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "Y" | "YES" | "T" | "TRUE" | "1" => Some(true),
                "N" | "NO" | "F" | "FALSE" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Compares two values the way the database would consider them equal.
    ///
    /// Numbers compare by value across representations.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Decimal(b)) | (Self::Decimal(b), Self::Int(a)) => {
                Decimal::from(*a) == *b
            }
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                #[allow(clippy::cast_precision_loss)]
                let a = *a as f64;
                (a - b).abs() < f64::EPSILON
            }
            (Self::Date(d), Self::Timestamp(t)) | (Self::Timestamp(t), Self::Date(d)) => {
                t.date() == *d && t.time() == NaiveTime::MIN
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A data row: values keyed by column name.
///
/// Keys are stored upper-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value (builder style).
    #[must_use]
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a value.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_uppercase(), value.into());
    }

    /// Returns the value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(&column.to_uppercase())
    }

    /// Returns the non-null text value of a column.
    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Returns the integer value of a column.
    #[must_use]
    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Returns the boolean value of a column.
    #[must_use]
    pub fn bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    /// Iterates over `(column, value)` pairs in column-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the column names of this row.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the row holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Projects the row onto the given key columns.
    ///
    /// Returns `None` when a key column is missing or null.
    #[must_use]
    pub fn key(&self, key_columns: &[String]) -> Option<Self> {
        let mut key = Self::new();
        for column in key_columns {
            let value = self.get(column)?;
            if value.is_null() {
                return None;
            }
            key.set(column, value.clone());
        }
        Some(key)
    }

    /// Returns whether this row matches `other` on every column of `other`.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        other
            .iter()
            .all(|(c, v)| self.get(c).is_some_and(|mine| mine.same_as(v)))
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(c, v)| format!("{c}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_case_insensitive() {
        let row = Row::new().with("ad_client_id", "0").with("Name", "System");
        assert_eq!(row.text("AD_CLIENT_ID"), Some("0"));
        assert_eq!(row.text("name"), Some("System"));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_key_projection() {
        let row = Row::new().with("id", 10_i64).with("name", "x");
        let key = row.key(&["ID".to_string()]).unwrap();
        assert_eq!(key.len(), 1);
        assert_eq!(key.int("id"), Some(10));

        let partial = Row::new().with("name", "x");
        assert!(partial.key(&["id".to_string()]).is_none());
    }

    #[test]
    fn test_numeric_equivalence() {
        assert!(Value::Int(5).same_as(&Value::Decimal(Decimal::from(5))));
        assert!(!Value::Int(5).same_as(&Value::Text("5".into())));
    }

    #[test]
    fn test_bool_forms() {
        assert_eq!(Value::from("Y").as_bool(), Some(true));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
    }
}
