//! Upsert mutation synthesizer.
//!
//! Derives the names and column bindings of the `upsert<Table>` mutation for
//! a table. The GraphQL layer turns a [`MutationField`] into schema types;
//! nothing here depends on a GraphQL library.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::{ScalarType, TableDescriptor};
use crate::error::SchemaError;
use crate::naming;

/// One column exposed as a GraphQL field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub field: String,
    pub column: String,
    pub scalar: ScalarType,
    pub nullable: bool,
    pub writable: bool,
    /// Part of at least one unique constraint.
    pub key: bool,
}

/// Everything needed to expose one table's upsert mutation and list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationField {
    pub table: TableDescriptor,
    /// `upsertBike`
    pub field_name: String,
    /// `Bike`
    pub type_name: String,
    /// `Bikes`
    pub plural_name: String,
    /// `bike`, the payload and input field carrying the row.
    pub row_field: String,
    pub columns: Vec<FieldBinding>,
}

impl MutationField {
    /// `UpsertBikeInput`
    pub fn input_type(&self) -> String {
        format!("Upsert{}Input", self.type_name)
    }

    /// `BikeInput`
    pub fn row_input_type(&self) -> String {
        format!("{}Input", self.type_name)
    }

    /// `BikeWhereUniqueInput`
    pub fn where_type(&self) -> String {
        format!("{}WhereUniqueInput", self.type_name)
    }

    /// `UpsertBikePayload`
    pub fn payload_type(&self) -> String {
        format!("Upsert{}Payload", self.type_name)
    }

    /// `allBikes`
    pub fn all_field(&self) -> String {
        format!("all{}", self.plural_name)
    }

    pub fn connection_type(&self) -> String {
        format!("{}Connection", self.plural_name)
    }

    pub fn edge_type(&self) -> String {
        format!("{}Edge", self.plural_name)
    }

    pub fn order_type(&self) -> String {
        format!("{}OrderBy", self.plural_name)
    }

    pub fn binding_for_field(&self, field: &str) -> Option<&FieldBinding> {
        self.columns.iter().find(|b| b.field == field)
    }

    pub fn binding_for_column(&self, column: &str) -> Option<&FieldBinding> {
        self.columns.iter().find(|b| b.column == column)
    }

    /// Columns accepted in `<Type>WhereUniqueInput`.
    pub fn key_bindings(&self) -> impl Iterator<Item = &FieldBinding> {
        self.columns.iter().filter(|b| b.key)
    }

    /// Columns accepted in `<Type>Input`.
    pub fn writable_bindings(&self) -> impl Iterator<Item = &FieldBinding> {
        self.columns.iter().filter(|b| b.writable)
    }
}

/// Derive the mutation descriptor for `table`.
pub fn synthesize(table: &TableDescriptor) -> Result<MutationField, SchemaError> {
    let mut by_field: HashMap<String, &str> = HashMap::new();
    let mut columns = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let field = naming::field_name(&column.name);
        if let Some(first) = by_field.insert(field.clone(), &column.name) {
            return Err(SchemaError::FieldNameCollision {
                table: table.qualified_name(),
                first: first.to_string(),
                second: column.name.clone(),
                field,
            });
        }
        columns.push(FieldBinding {
            field,
            column: column.name.clone(),
            scalar: column.scalar,
            nullable: column.nullable,
            writable: column.writable,
            key: table.is_key_column(&column.name),
        });
    }

    Ok(MutationField {
        table: table.clone(),
        field_name: naming::upsert_field_name(&table.name),
        type_name: naming::type_name(&table.name),
        plural_name: naming::plural_type_name(&table.name),
        row_field: naming::row_field_name(&table.name),
        columns,
    })
}

/// Synthesize every table, skipping the ones that fail.
///
/// Tables whose type name is already taken by an earlier table are skipped
/// too. Failures are returned alongside the successes so the caller can log
/// them.
pub fn synthesize_all<'t, I>(tables: I) -> (Vec<MutationField>, Vec<(String, SchemaError)>)
where
    I: IntoIterator<Item = &'t TableDescriptor>,
{
    let mut fields: Vec<MutationField> = Vec::new();
    let mut failures = Vec::new();

    for table in tables {
        let field = match synthesize(table) {
            Ok(field) => field,
            Err(e) => {
                failures.push((table.qualified_name(), e));
                continue;
            }
        };

        if let Some(existing) = fields.iter().find(|f| f.type_name == field.type_name) {
            failures.push((
                table.qualified_name(),
                SchemaError::TypeNameCollision {
                    first: existing.table.qualified_name(),
                    second: table.qualified_name(),
                    type_name: field.type_name.clone(),
                },
            ));
            continue;
        }
        fields.push(field);
    }

    (fields, failures)
}
