//! In-memory row store.
//!
//! Mirrors the observable behavior of `INSERT ... ON CONFLICT DO UPDATE`
//! closely enough for schema and engine tests: sequence defaults, NOT NULL
//! checks and unique checks across every constraint of the table.

use ::async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use upsert_core::{
    BoundStatement, ColumnDescriptor, EngineResult, OrderBy, Row, SqlValue, StorageError,
    TableDescriptor,
};

use crate::row_store::RowStore;

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<Row>,
    sequences: HashMap<String, i64>,
}

/// Thread-safe in-memory store keyed by qualified table name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, TableState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `qualified_name`.
    pub fn row_count(&self, qualified_name: &str) -> Result<usize, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(qualified_name).map(|t| t.rows.len()).unwrap_or(0))
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn upsert(&self, table: &TableDescriptor, statement: &BoundStatement) -> EngineResult<Row> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let state = tables.entry(statement.table.clone()).or_default();
        Ok(apply(state, table, statement)?)
    }

    async fn list(&self, table: &TableDescriptor, order: &[OrderBy]) -> EngineResult<Vec<Row>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut rows = tables
            .get(&table.qualified_name())
            .map(|t| t.rows.clone())
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            order
                .iter()
                .map(|term| {
                    let ordering = a.value(&term.column).sort_cmp(b.value(&term.column));
                    if term.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }
}

fn apply(
    state: &mut TableState,
    table: &TableDescriptor,
    statement: &BoundStatement,
) -> Result<Row, StorageError> {
    let existing = state.rows.iter().position(|row| {
        statement
            .columns
            .iter()
            .filter(|c| c.key)
            .all(|c| row.value(&c.column) == &c.value)
    });

    let candidate = match existing {
        Some(index) => {
            let mut row = state.rows[index].clone();
            for column in statement.columns.iter().filter(|c| !c.key && c.supplied) {
                row.insert(column.column.clone(), column.value.clone());
            }
            row
        }
        None => {
            let mut row = Row::new();
            for column in &table.columns {
                let value = match statement.column(&column.name) {
                    Some(bound) if bound.key || bound.supplied => bound.value.clone(),
                    _ => default_value(&mut state.sequences, column)?,
                };
                row.insert(column.name.clone(), value);
            }
            row
        }
    };

    check_not_null(table, &candidate)?;
    check_unique(table, &state.rows, existing, &candidate)?;

    match existing {
        Some(index) => state.rows[index] = candidate.clone(),
        None => state.rows.push(candidate.clone()),
    }
    Ok(candidate)
}

fn default_value(
    sequences: &mut HashMap<String, i64>,
    column: &ColumnDescriptor,
) -> Result<SqlValue, StorageError> {
    let expr = match (&column.default, column.writable) {
        (Some(expr), true) => expr.trim(),
        _ => return Ok(SqlValue::Null),
    };

    if expr.starts_with("nextval(") {
        let next = sequences.entry(column.name.clone()).or_insert(0);
        *next += 1;
        return Ok(SqlValue::Int(*next));
    }

    let literal = parse_literal(expr).ok_or_else(|| StorageError::Database {
        code: Some("0A000".to_string()),
        message: format!(
            "default expression {} for column {} is not supported in memory",
            expr, column.name
        ),
    })?;
    literal
        .coerce(&column.name, column.scalar)
        .map_err(|e| StorageError::Decode {
            column: column.name.clone(),
            reason: e.to_string(),
        })
}

/// Constant defaults as the catalog renders them: `'abc'::text`, `42`,
/// `0.5`, `true`, `NULL`.
fn parse_literal(expr: &str) -> Option<SqlValue> {
    if let Some(rest) = expr.strip_prefix('\'') {
        let end = rest.rfind('\'')?;
        return Some(SqlValue::Text(rest[..end].replace("''", "'")));
    }
    let bare = expr.split("::").next().unwrap_or(expr).trim();
    let bare = bare.trim_start_matches('(').trim_end_matches(')');
    match bare.to_ascii_lowercase().as_str() {
        "null" => return Some(SqlValue::Null),
        "true" => return Some(SqlValue::Bool(true)),
        "false" => return Some(SqlValue::Bool(false)),
        _ => {}
    }
    if let Ok(i) = bare.parse::<i64>() {
        return Some(SqlValue::Int(i));
    }
    bare.parse::<f64>().ok().map(SqlValue::Float)
}

fn check_not_null(table: &TableDescriptor, row: &Row) -> Result<(), StorageError> {
    match table
        .columns
        .iter()
        .find(|c| !c.nullable && row.value(&c.name).is_null())
    {
        Some(column) => Err(StorageError::Database {
            code: Some("23502".to_string()),
            message: format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                column.name, table.name
            ),
        }),
        None => Ok(()),
    }
}

fn check_unique(
    table: &TableDescriptor,
    rows: &[Row],
    skip: Option<usize>,
    candidate: &Row,
) -> Result<(), StorageError> {
    for constraint in &table.constraints {
        let values: Vec<&SqlValue> = constraint
            .columns
            .iter()
            .map(|c| candidate.value(c))
            .collect();
        // NULLs never collide.
        if values.iter().any(|v| v.is_null()) {
            continue;
        }

        let clash = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != skip
                && constraint
                    .columns
                    .iter()
                    .zip(&values)
                    .all(|(c, v)| row.value(c) == *v)
        });
        if clash {
            return Err(StorageError::Database {
                code: Some("23505".to_string()),
                message: format!(
                    "duplicate key value violates unique constraint \"{}\"",
                    constraint.name
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(
            parse_literal("'kona'::character varying"),
            Some(SqlValue::from("kona"))
        );
        assert_eq!(parse_literal("'it''s'::text"), Some(SqlValue::from("it's")));
        assert_eq!(parse_literal("42"), Some(SqlValue::Int(42)));
        assert_eq!(parse_literal("(-1)"), Some(SqlValue::Int(-1)));
        assert_eq!(parse_literal("0.5"), Some(SqlValue::Float(0.5)));
        assert_eq!(parse_literal("false"), Some(SqlValue::Bool(false)));
        assert_eq!(parse_literal("NULL::text"), Some(SqlValue::Null));
        assert_eq!(parse_literal("now()"), None);
    }

    #[test]
    fn test_sequence_default_counts_per_column() -> Result<(), StorageError> {
        let mut sequences = HashMap::new();
        let column = ColumnDescriptor {
            name: "id".to_string(),
            sql_type: "integer".to_string(),
            scalar: upsert_core::ScalarType::Integer,
            nullable: false,
            default: Some("nextval('bikes_id_seq'::regclass)".to_string()),
            writable: true,
        };
        assert_eq!(default_value(&mut sequences, &column)?, SqlValue::Int(1));
        assert_eq!(default_value(&mut sequences, &column)?, SqlValue::Int(2));
        Ok(())
    }
}
