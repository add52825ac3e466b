//! Values exchanged between the GraphQL layer, the binder, and row stores.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::descriptor::{ScalarType, WireType};
use crate::error::ValidationError;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Json(_) => "json",
        }
    }

    /// Coerce into the wire representation for a column of `scalar` type.
    ///
    /// The result is always `Null` or the variant matching
    /// `scalar.wire_type()`.
    pub fn coerce(self, column: &str, scalar: ScalarType) -> Result<SqlValue, ValidationError> {
        let mismatch = |got: &SqlValue| ValidationError::TypeMismatch {
            column: column.to_string(),
            expected: scalar.to_string(),
            got: got.kind().to_string(),
        };

        if self.is_null() {
            return Ok(SqlValue::Null);
        }

        match scalar.wire_type() {
            WireType::Int8 => match self {
                SqlValue::Int(i) => Ok(SqlValue::Int(i)),
                SqlValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(SqlValue::Int(f as i64))
                }
                SqlValue::Text(ref s) => s
                    .trim()
                    .parse::<i64>()
                    .map(SqlValue::Int)
                    .map_err(|_| mismatch(&self)),
                other => Err(mismatch(&other)),
            },
            WireType::Float8 => match self {
                SqlValue::Float(f) => Ok(SqlValue::Float(f)),
                SqlValue::Int(i) => Ok(SqlValue::Float(i as f64)),
                SqlValue::Text(ref s) => s
                    .trim()
                    .parse::<f64>()
                    .map(SqlValue::Float)
                    .map_err(|_| mismatch(&self)),
                other => Err(mismatch(&other)),
            },
            WireType::Bool => match self {
                SqlValue::Bool(b) => Ok(SqlValue::Bool(b)),
                other => Err(mismatch(&other)),
            },
            WireType::Text => match (scalar, self) {
                (ScalarType::Json, SqlValue::Json(v)) => Ok(SqlValue::Text(v.to_string())),
                (ScalarType::Json, SqlValue::Text(s)) => {
                    // Plain strings are JSON string values, not documents.
                    Ok(SqlValue::Text(serde_json::Value::String(s).to_string()))
                }
                (ScalarType::Json, SqlValue::Int(i)) => Ok(SqlValue::Text(i.to_string())),
                (ScalarType::Json, SqlValue::Float(f)) => Ok(SqlValue::Text(f.to_string())),
                (ScalarType::Json, SqlValue::Bool(b)) => Ok(SqlValue::Text(b.to_string())),
                (_, SqlValue::Text(s)) => Ok(SqlValue::Text(s)),
                (ScalarType::Numeric, SqlValue::Int(i)) => Ok(SqlValue::Text(i.to_string())),
                (ScalarType::Numeric, SqlValue::Float(f)) => Ok(SqlValue::Text(f.to_string())),
                (_, other) => Err(mismatch(&other)),
            },
        }
    }

    /// Ordering used when sorting rows: nulls sort last, mixed kinds fall
    /// back to a fixed kind order.
    pub fn sort_cmp(&self, other: &SqlValue) -> Ordering {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
            (SqlValue::Null, _) => Ordering::Greater,
            (_, SqlValue::Null) => Ordering::Less,
            (SqlValue::Bool(a), SqlValue::Bool(b)) => a.cmp(b),
            (SqlValue::Int(a), SqlValue::Int(b)) => a.cmp(b),
            (SqlValue::Float(a), SqlValue::Float(b)) => a.total_cmp(b),
            (SqlValue::Int(a), SqlValue::Float(b)) => (*a as f64).total_cmp(b),
            (SqlValue::Float(a), SqlValue::Int(b)) => a.total_cmp(&(*b as f64)),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Json(a), SqlValue::Json(b)) => a.to_string().cmp(&b.to_string()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SqlValue::Bool(_) => 0,
            SqlValue::Int(_) | SqlValue::Float(_) => 1,
            SqlValue::Text(_) => 2,
            SqlValue::Json(_) => 3,
            SqlValue::Null => 4,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

/// A persisted row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Value of `column`, treating a missing column as null.
    pub fn value(&self, column: &str) -> &SqlValue {
        self.values.get(column).unwrap_or(&SqlValue::Null)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.values.insert(column.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
