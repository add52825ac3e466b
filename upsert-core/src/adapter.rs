//! Schema descriptor adapter.
//!
//! Turns the shape produced by catalog introspection into a
//! [`TableDescriptor`]. Pure; runs once per table at schema-build time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::descriptor::{ColumnDescriptor, ScalarType, TableDescriptor, UniqueConstraint};
use crate::error::SchemaError;

/// Identity column kind as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    Always,
    ByDefault,
}

/// Raw column as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub identity: Option<IdentityKind>,
    pub generated: bool,
    /// The column type is a user-defined enum.
    pub is_enum: bool,
}

/// Raw unique or primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConstraint {
    pub name: String,
    pub columns: Vec<String>,
    pub primary: bool,
}

/// Raw table as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub constraints: Vec<RawConstraint>,
}

/// Normalize an introspected table.
///
/// Constraints that include a read-only column cannot serve as an upsert key
/// (the insert branch would have to write it) and are dropped. A table left
/// without any constraint is rejected.
pub fn describe(raw: RawTable) -> Result<TableDescriptor, SchemaError> {
    let table_label = format!("{}.{}", raw.schema, raw.name);

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(raw.columns.len());
    for column in &raw.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                table: table_label,
                column: column.name.clone(),
            });
        }
        columns.push(describe_column(&raw, column)?);
    }

    let mut constraints = Vec::with_capacity(raw.constraints.len());
    for constraint in &raw.constraints {
        if constraint.columns.is_empty() {
            return Err(SchemaError::EmptyConstraint {
                table: table_label,
                constraint: constraint.name.clone(),
            });
        }

        let mut usable = true;
        for name in &constraint.columns {
            match columns.iter().find(|c: &&ColumnDescriptor| &c.name == name) {
                Some(column) => usable &= column.writable,
                None => {
                    return Err(SchemaError::UnknownConstraintColumn {
                        table: table_label,
                        constraint: constraint.name.clone(),
                        column: name.clone(),
                    })
                }
            }
        }

        if usable {
            constraints.push(UniqueConstraint {
                name: constraint.name.clone(),
                columns: constraint.columns.clone(),
                primary: constraint.primary,
            });
        }
    }

    if constraints.is_empty() {
        return Err(SchemaError::NoUniqueConstraint { table: table_label });
    }

    Ok(TableDescriptor {
        schema: raw.schema,
        name: raw.name,
        columns,
        constraints,
    })
}

fn describe_column(table: &RawTable, column: &RawColumn) -> Result<ColumnDescriptor, SchemaError> {
    let scalar = if column.is_enum {
        ScalarType::Text
    } else {
        map_scalar(&column.data_type).ok_or_else(|| SchemaError::UnsupportedType {
            table: format!("{}.{}", table.schema, table.name),
            column: column.name.clone(),
            sql_type: column.data_type.clone(),
        })?
    };

    let writable = !column.generated && column.identity != Some(IdentityKind::Always);

    let default = match (column.identity, &column.default) {
        (_, Some(expr)) => Some(expr.clone()),
        (Some(IdentityKind::ByDefault), None) => Some(format!(
            "nextval(pg_get_serial_sequence('{}', '{}'))",
            escape_literal(&format!(
                "{}.{}",
                quote_ident(&table.schema),
                quote_ident(&table.name)
            )),
            escape_literal(&column.name)
        )),
        _ => None,
    };

    Ok(ColumnDescriptor {
        name: column.name.clone(),
        sql_type: column.data_type.clone(),
        scalar,
        nullable: !column.not_null,
        default,
        writable,
    })
}

/// Map a catalog type name to its scalar tag.
pub fn map_scalar(data_type: &str) -> Option<ScalarType> {
    let lowered = data_type.trim().to_ascii_lowercase();
    if lowered.ends_with("[]") {
        return None;
    }
    // Strip modifiers: `character varying(40)`, `numeric(10,2)`,
    // `timestamp(3) with time zone`.
    let base: String = match (lowered.find('('), lowered.find(')')) {
        (Some(open), Some(close)) if close > open => {
            format!("{}{}", &lowered[..open], &lowered[close + 1..])
        }
        _ => lowered,
    };
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");

    let scalar = match base.as_str() {
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
        | "citext" | "name" => ScalarType::Text,
        "smallint" | "integer" | "int" | "int2" | "int4" | "smallserial" | "serial" => {
            ScalarType::Integer
        }
        "bigint" | "int8" | "bigserial" => ScalarType::BigInt,
        "real" | "double precision" | "float4" | "float8" => ScalarType::Float,
        "numeric" | "decimal" => ScalarType::Numeric,
        "boolean" | "bool" => ScalarType::Boolean,
        "uuid" => ScalarType::Uuid,
        "date" => ScalarType::Date,
        "timestamp" | "timestamptz" | "timestamp without time zone"
        | "timestamp with time zone" => ScalarType::Timestamp,
        "json" | "jsonb" => ScalarType::Json,
        _ => return None,
    };
    Some(scalar)
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}
