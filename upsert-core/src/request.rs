//! Per-request upsert input and output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::value::{Row, SqlValue};

/// An upsert call: the unique key selecting the row and the values to write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    /// Column name to value; must cover exactly one unique constraint.
    pub where_values: BTreeMap<String, SqlValue>,
    /// Column name to value; full or partial row.
    pub input: BTreeMap<String, SqlValue>,
    /// Opaque token echoed back in the result.
    pub client_mutation_id: Option<String>,
}

impl UpsertRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.where_values.insert(column.into(), value.into());
        self
    }

    pub fn with_input(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.input.insert(column.into(), value.into());
        self
    }

    pub fn with_client_mutation_id(mut self, id: impl Into<String>) -> Self {
        self.client_mutation_id = Some(id.into());
        self
    }

    pub fn where_keys(&self) -> BTreeSet<&str> {
        self.where_values.keys().map(String::as_str).collect()
    }

    /// `input` overlaid with `where`. A key column always takes its `where`
    /// value so the row stays addressable by the key the caller named.
    pub fn merged(&self) -> BTreeMap<&str, &SqlValue> {
        let mut merged: BTreeMap<&str, &SqlValue> = self
            .input
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        for (k, v) in &self.where_values {
            merged.insert(k.as_str(), v);
        }
        merged
    }
}

/// The row as persisted plus the echoed client mutation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertResult {
    pub row: Row,
    pub client_mutation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_prefers_where_values() {
        let request = UpsertRequest::new()
            .with_where("serialNumber", "abc123")
            .with_input("serialNumber", "zzz999")
            .with_input("make", "kona");

        let merged = request.merged();
        assert_eq!(merged.get("serialNumber"), Some(&&SqlValue::from("abc123")));
        assert_eq!(merged.get("make"), Some(&&SqlValue::from("kona")));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_where_keys() {
        let request = UpsertRequest::new()
            .with_where("a", 1i64)
            .with_where("b", 2i64);
        let keys: Vec<&str> = request.where_keys().into_iter().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
