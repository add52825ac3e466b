//! PostgreSQL catalog introspection.
//!
//! Reads ordinary tables, their columns and their primary/unique constraints
//! from `pg_catalog` into [`RawTable`]s for the descriptor adapter.

use std::collections::BTreeMap;
use tokio_postgres::Client;
use tracing::{debug, instrument};

use upsert_core::{IdentityKind, RawColumn, RawConstraint, RawTable};

use crate::error::ApiResult;

const COLUMNS_SQL: &str = r#"
SELECT n.nspname::text AS schema_name,
       c.relname::text AS table_name,
       a.attname::text AS column_name,
       pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
       a.attnotnull AS not_null,
       pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_expr,
       a.attidentity::text AS identity,
       (a.attgenerated::text <> '') AS generated,
       (t.typtype = 'e') AS is_enum
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = c.oid AND d.adnum = a.attnum
WHERE c.relkind = 'r'
  AND n.nspname::text = ANY($1::text[])
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY n.nspname, c.relname, a.attnum
"#;

const CONSTRAINTS_SQL: &str = r#"
SELECT n.nspname::text AS schema_name,
       c.relname::text AS table_name,
       con.conname::text AS constraint_name,
       (con.contype = 'p') AS is_primary,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_catalog.pg_attribute a
             ON a.attrelid = con.conrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ) AS columns
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE con.contype IN ('p', 'u')
  AND c.relkind = 'r'
  AND n.nspname::text = ANY($1::text[])
ORDER BY n.nspname, c.relname, con.contype, con.conname
"#;

/// One `pg_attribute` row.
#[derive(Debug, Clone)]
struct ColumnRecord {
    schema: String,
    table: String,
    column: RawColumn,
}

/// One `pg_constraint` row.
#[derive(Debug, Clone)]
struct ConstraintRecord {
    schema: String,
    table: String,
    constraint: RawConstraint,
}

/// Load every ordinary table in `schemas`, ordered by schema then name.
#[instrument(skip(client))]
pub async fn load_tables(client: &Client, schemas: &[String]) -> ApiResult<Vec<RawTable>> {
    let schemas: Vec<String> = schemas.to_vec();

    let column_rows = client.query(COLUMNS_SQL, &[&schemas]).await?;
    let mut columns = Vec::with_capacity(column_rows.len());
    for row in &column_rows {
        let identity: Option<String> = row.try_get("identity")?;
        columns.push(ColumnRecord {
            schema: row.try_get("schema_name")?,
            table: row.try_get("table_name")?,
            column: RawColumn {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                not_null: row.try_get("not_null")?,
                default: row.try_get("default_expr")?,
                identity: identity.as_deref().and_then(parse_identity),
                generated: row.try_get::<_, Option<bool>>("generated")?.unwrap_or(false),
                is_enum: row.try_get::<_, Option<bool>>("is_enum")?.unwrap_or(false),
            },
        });
    }

    let constraint_rows = client.query(CONSTRAINTS_SQL, &[&schemas]).await?;
    let mut constraints = Vec::with_capacity(constraint_rows.len());
    for row in &constraint_rows {
        constraints.push(ConstraintRecord {
            schema: row.try_get("schema_name")?,
            table: row.try_get("table_name")?,
            constraint: RawConstraint {
                name: row.try_get("constraint_name")?,
                columns: row.try_get("columns")?,
                primary: row.try_get("is_primary")?,
            },
        });
    }

    let tables = assemble(columns, constraints);
    debug!(tables = tables.len(), "Introspected tables");
    Ok(tables)
}

/// `pg_attribute.attidentity`: `a` always, `d` by default, empty otherwise.
fn parse_identity(raw: &str) -> Option<IdentityKind> {
    match raw {
        "a" => Some(IdentityKind::Always),
        "d" => Some(IdentityKind::ByDefault),
        _ => None,
    }
}

fn assemble(columns: Vec<ColumnRecord>, constraints: Vec<ConstraintRecord>) -> Vec<RawTable> {
    let mut tables: BTreeMap<(String, String), RawTable> = BTreeMap::new();

    for record in columns {
        tables
            .entry((record.schema.clone(), record.table.clone()))
            .or_insert_with(|| RawTable {
                schema: record.schema,
                name: record.table,
                columns: Vec::new(),
                constraints: Vec::new(),
            })
            .columns
            .push(record.column);
    }

    for record in constraints {
        // A table with no visible columns is not one we can expose.
        if let Some(table) = tables.get_mut(&(record.schema, record.table)) {
            table.constraints.push(record.constraint);
        }
    }

    tables.into_values().collect()
}
