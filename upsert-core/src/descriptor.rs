//! Normalized table model
//!
//! Built once per table at schema-build time and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// SCALAR TYPES
// ============================================================================

/// Scalar type tag for a column, independent of the exact SQL spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Text,
    Integer,
    BigInt,
    Float,
    Numeric,
    Boolean,
    Uuid,
    Date,
    Timestamp,
    Json,
}

impl ScalarType {
    /// How a value of this type travels as a statement parameter.
    pub fn wire_type(&self) -> WireType {
        match self {
            ScalarType::Integer | ScalarType::BigInt => WireType::Int8,
            ScalarType::Float => WireType::Float8,
            ScalarType::Boolean => WireType::Bool,
            ScalarType::Text
            | ScalarType::Numeric
            | ScalarType::Uuid
            | ScalarType::Date
            | ScalarType::Timestamp
            | ScalarType::Json => WireType::Text,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Parameter representation on the wire. Every parameter in a template is
/// cast to one of these so the driver never has to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Bool,
    Int8,
    Float8,
    Text,
}

impl WireType {
    pub fn cast(&self) -> &'static str {
        match self {
            WireType::Bool => "bool",
            WireType::Int8 => "int8",
            WireType::Float8 => "float8",
            WireType::Text => "text",
        }
    }
}

// ============================================================================
// COLUMNS & CONSTRAINTS
// ============================================================================

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// SQL type as rendered by the catalog, e.g. `character varying(40)`.
    pub sql_type: String,
    pub scalar: ScalarType,
    pub nullable: bool,
    /// Default expression evaluated on insert when no value is supplied.
    pub default: Option<String>,
    /// False for identity-always and generated columns.
    pub writable: bool,
}

impl ColumnDescriptor {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// A column that must receive a non-null value on insert.
    pub fn is_required(&self) -> bool {
        self.writable && !self.nullable && !self.has_default()
    }

    /// Inclusive bounds of integer columns narrower than `bigint`.
    pub fn int_bounds(&self) -> Option<(i64, i64)> {
        match self.sql_type.trim().to_ascii_lowercase().as_str() {
            "smallint" | "int2" | "smallserial" => Some((i16::MIN.into(), i16::MAX.into())),
            "integer" | "int" | "int4" | "serial" => Some((i32::MIN.into(), i32::MAX.into())),
            _ => None,
        }
    }
}

/// An ordered set of columns that together are unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
    pub primary: bool,
}

impl UniqueConstraint {
    pub fn column_set(&self) -> BTreeSet<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// Normalized description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub constraints: Vec<UniqueConstraint>,
}

impl TableDescriptor {
    /// `schema.name`, used for cache keys and messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_key(&self) -> Option<&UniqueConstraint> {
        self.constraints.iter().find(|c| c.primary)
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.constraints.iter().any(|c| c.contains(name))
    }

    /// Columns participating in any unique constraint, in table order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| self.is_key_column(&c.name))
    }

    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.writable)
    }

    /// Whether `constraint` is one of this table's constraints.
    pub fn owns_constraint(&self, constraint: &UniqueConstraint) -> bool {
        let wanted = constraint.column_set();
        self.constraints.iter().any(|c| c.column_set() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: "bikes".to_string(),
            columns: vec![
                ColumnDescriptor {
                    name: "id".to_string(),
                    sql_type: "integer".to_string(),
                    scalar: ScalarType::Integer,
                    nullable: false,
                    default: Some("nextval('bikes_id_seq'::regclass)".to_string()),
                    writable: true,
                },
                ColumnDescriptor {
                    name: "serialNumber".to_string(),
                    sql_type: "character varying".to_string(),
                    scalar: ScalarType::Text,
                    nullable: false,
                    default: None,
                    writable: true,
                },
                ColumnDescriptor {
                    name: "make".to_string(),
                    sql_type: "character varying".to_string(),
                    scalar: ScalarType::Text,
                    nullable: true,
                    default: None,
                    writable: true,
                },
            ],
            constraints: vec![
                UniqueConstraint {
                    name: "bikes_pkey".to_string(),
                    columns: vec!["id".to_string()],
                    primary: true,
                },
                UniqueConstraint {
                    name: "bikes_serialNumber_key".to_string(),
                    columns: vec!["serialNumber".to_string()],
                    primary: false,
                },
            ],
        }
    }

    #[test]
    fn test_key_columns_follow_table_order() {
        let t = table();
        let keys: Vec<&str> = t.key_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, vec!["id", "serialNumber"]);
        assert!(!t.is_key_column("make"));
    }

    #[test]
    fn test_required_columns() {
        let t = table();
        assert!(!t.column("id").map(|c| c.is_required()).unwrap_or(true));
        assert!(t.column("serialNumber").map(|c| c.is_required()).unwrap_or(false));
        assert!(!t.column("make").map(|c| c.is_required()).unwrap_or(true));
    }

    #[test]
    fn test_owns_constraint_ignores_column_order_and_name() {
        let t = table();
        let foreign = UniqueConstraint {
            name: "other".to_string(),
            columns: vec!["serialNumber".to_string()],
            primary: false,
        };
        assert!(t.owns_constraint(&foreign));

        let missing = UniqueConstraint {
            name: "bikes_make_key".to_string(),
            columns: vec!["make".to_string()],
            primary: false,
        };
        assert!(!t.owns_constraint(&missing));
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(ScalarType::Integer.wire_type(), WireType::Int8);
        assert_eq!(ScalarType::BigInt.wire_type(), WireType::Int8);
        assert_eq!(ScalarType::Float.wire_type(), WireType::Float8);
        assert_eq!(ScalarType::Uuid.wire_type(), WireType::Text);
        assert_eq!(WireType::Bool.cast(), "bool");
    }
}
