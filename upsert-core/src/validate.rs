//! Conflict/validation layer.
//!
//! Everything here is pure and runs before any statement is executed, so a
//! failure can never leave a partial write behind.

use std::collections::BTreeSet;

use crate::descriptor::{TableDescriptor, UniqueConstraint};
use crate::error::ValidationError;
use crate::request::UpsertRequest;

/// Pick the unique constraint whose column set equals `where_keys` exactly.
///
/// Subsets, supersets and disjoint sets all fail with `AmbiguousKey`
/// (zero matches). Keys that are not columns fail with `UnknownColumn`.
pub fn resolve_constraint<'t>(
    table: &'t TableDescriptor,
    where_keys: &BTreeSet<&str>,
) -> Result<&'t UniqueConstraint, ValidationError> {
    if let Some(unknown) = where_keys.iter().find(|k| !table.has_column(k)) {
        return Err(ValidationError::UnknownColumn {
            table: table.qualified_name(),
            column: unknown.to_string(),
        });
    }

    let mut matches = table
        .constraints
        .iter()
        .filter(|c| &c.column_set() == where_keys);

    match (matches.next(), matches.next()) {
        (Some(constraint), None) => Ok(constraint),
        (first, _) => {
            let count = if first.is_none() {
                0
            } else {
                2 + matches.count()
            };
            Err(ValidationError::AmbiguousKey {
                table: table.qualified_name(),
                keys: where_keys.iter().map(|k| k.to_string()).collect(),
                matches: count,
            })
        }
    }
}

/// Request checks that do not depend on the chosen constraint:
/// known input columns, writable input columns, non-null key values, and
/// required columns present after merging.
pub fn validate_request(
    table: &TableDescriptor,
    request: &UpsertRequest,
) -> Result<(), ValidationError> {
    for column in request.input.keys() {
        match table.column(column) {
            None => {
                return Err(ValidationError::UnknownColumn {
                    table: table.qualified_name(),
                    column: column.clone(),
                })
            }
            Some(c) if !c.writable => {
                return Err(ValidationError::ReadOnlyColumn {
                    table: table.qualified_name(),
                    column: column.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for (column, value) in &request.where_values {
        if value.is_null() {
            return Err(ValidationError::NullKeyValue {
                table: table.qualified_name(),
                column: column.clone(),
            });
        }
    }

    let merged = request.merged();
    for column in table.columns.iter().filter(|c| c.is_required()) {
        let present = merged
            .get(column.name.as_str())
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if !present {
            return Err(ValidationError::MissingRequiredColumn {
                table: table.qualified_name(),
                column: column.name.clone(),
            });
        }
    }

    Ok(())
}
