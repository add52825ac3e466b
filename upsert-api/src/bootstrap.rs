//! Startup composition: introspected tables to an executable schema.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use upsert_core::{describe, synthesize_all, MutationField, RawTable, TableDescriptor};
use upsert_storage::UpsertEngine;

use crate::error::{ApiError, ApiResult};
use crate::graphql::{build_schema, Schema};

/// Normalize every table, logging and skipping the ones that cannot be
/// exposed.
pub fn describe_tables(raw: Vec<RawTable>) -> Vec<TableDescriptor> {
    raw.into_iter()
        .filter_map(|table| {
            let name = format!("{}.{}", table.schema, table.name);
            match describe(table) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!(table = %name, error = %e, "Skipping table");
                    None
                }
            }
        })
        .collect()
}

/// Describe, synthesize and build the schema. Returns the exposed mutation
/// fields alongside the schema.
pub fn schema_from_tables(
    raw: Vec<RawTable>,
    engine: Arc<UpsertEngine>,
) -> ApiResult<(Schema, Vec<MutationField>)> {
    let tables = describe_tables(raw);
    let (fields, failures) = synthesize_all(&tables);
    for (table, error) in &failures {
        warn!(table = %table, error = %error, "Skipping table");
    }

    let schema = build_schema(&fields, engine)?;
    info!(
        tables = fields.len(),
        skipped = failures.len(),
        "GraphQL schema built"
    );
    Ok((schema, fields))
}

/// Write the schema SDL to `path`.
pub fn export_sdl(schema: &Schema, path: &Path) -> ApiResult<()> {
    std::fs::write(path, schema.sdl()).map_err(|e| {
        ApiError::internal_error(format!("Failed to write schema to {}: {}", path.display(), e))
    })?;
    info!(path = %path.display(), "Schema exported");
    Ok(())
}
