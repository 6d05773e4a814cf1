//! Column values and rows.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Name of the primary key column every table carries.
pub const ID_COLUMN: &str = "Id";

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// SQL-style null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// UUID, used for identifiers.
    Uuid(Uuid),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns the type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

/// Values above `i64::MAX` saturate.
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// A row: column values bound by name.
///
/// Rows double as the parameter set of a write: an insert carries the
/// full row, an update carries only the columns to change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the row with `column` bound to `value`.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Binds `column` to `value`, replacing any previous binding.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Returns the raw value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Returns true if the column is bound.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Returns the number of bound columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no column is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overwrites this row's columns with every column bound in `changes`.
    pub fn merge(&mut self, changes: &Row) {
        for (column, value) in &changes.0 {
            self.0.insert(column.clone(), value.clone());
        }
    }

    /// Returns the primary key value, if bound.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.get(ID_COLUMN)
    }

    fn require(&self, column: &str) -> StoreResult<&Value> {
        self.get(column)
            .ok_or_else(|| StoreError::missing_column(column))
    }

    /// Reads a text column.
    pub fn text(&self, column: &str) -> StoreResult<&str> {
        match self.require(column)? {
            Value::Text(s) => Ok(s),
            _ => Err(StoreError::type_mismatch(column, "text")),
        }
    }

    /// Reads an integer column.
    pub fn integer(&self, column: &str) -> StoreResult<i64> {
        match self.require(column)? {
            Value::Integer(i) => Ok(*i),
            _ => Err(StoreError::type_mismatch(column, "integer")),
        }
    }

    /// Reads a non-negative integer column.
    pub fn unsigned(&self, column: &str) -> StoreResult<u64> {
        let value = self.integer(column)?;
        u64::try_from(value).map_err(|_| StoreError::type_mismatch(column, "unsigned integer"))
    }

    /// Reads a boolean column.
    pub fn boolean(&self, column: &str) -> StoreResult<bool> {
        match self.require(column)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(StoreError::type_mismatch(column, "bool")),
        }
    }

    /// Reads a UUID column.
    pub fn uuid(&self, column: &str) -> StoreResult<Uuid> {
        match self.require(column)? {
            Value::Uuid(u) => Ok(*u),
            _ => Err(StoreError::type_mismatch(column, "uuid")),
        }
    }

    /// Reads a timestamp column.
    pub fn timestamp(&self, column: &str) -> StoreResult<DateTime<Utc>> {
        match self.require(column)? {
            Value::Timestamp(t) => Ok(*t),
            _ => Err(StoreError::type_mismatch(column, "timestamp")),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
