//! Upsert statement builder.
//!
//! A [`StatementTemplate`] is built once per (table, constraint) pair and
//! reused for every request on that pair. Its parameter list never depends on
//! which columns a request supplies: every non-key column gets a value
//! parameter and a "supplied" flag, and the SQL branches on the flag.
//!
//! For `bikes` keyed on `serialNumber` the rendered statement looks like:
//!
//! ```text
//! INSERT INTO "public"."bikes" AS "__target" ("serialNumber", "id", "weight", ...)
//! VALUES ($1::text,
//!         CASE WHEN $3::bool THEN $2::int8 ELSE nextval('bikes_id_seq'::regclass) END,
//!         CASE WHEN $5::bool THEN $4::float8 ELSE NULL END, ...)
//! ON CONFLICT ("serialNumber") DO UPDATE SET
//!   "id" = CASE WHEN $3::bool THEN EXCLUDED."id" ELSE "__target"."id" END, ...
//! RETURNING "id", "serialNumber", "weight", ...
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::adapter::quote_ident;
use crate::descriptor::{ColumnDescriptor, ScalarType, TableDescriptor, UniqueConstraint, WireType};
use crate::error::{EngineResult, StatementBuildError, ValidationError};
use crate::request::UpsertRequest;
use crate::validate::validate_request;
use crate::value::SqlValue;

const TARGET_ALIAS: &str = "\"__target\"";

/// Rejects integers the column's SQL type cannot hold, matching SQLSTATE 22003.
fn check_range(column: &ColumnDescriptor, value: &SqlValue) -> Result<(), ValidationError> {
    match (value, column.int_bounds()) {
        (SqlValue::Int(i), Some((lo, hi))) if *i < lo || *i > hi => {
            Err(ValidationError::OutOfRange {
                column: column.name.clone(),
                sql_type: column.sql_type.clone(),
                value: *i,
            })
        }
        _ => Ok(()),
    }
}

/// Where a column's values land in the parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub column: String,
    pub scalar: ScalarType,
    pub wire: WireType,
    /// 1-based index of the value parameter.
    pub value_param: usize,
    /// 1-based index of the "supplied" flag; `None` for conflict-target columns.
    pub flag_param: Option<usize>,
}

impl ParamSlot {
    pub fn is_key(&self) -> bool {
        self.flag_param.is_none()
    }
}

/// Parameterized upsert statement for one (table, constraint) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    table: String,
    conflict_columns: Vec<String>,
    sql: Arc<str>,
    slots: Vec<ParamSlot>,
    param_count: usize,
}

/// One positional parameter ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub wire: WireType,
    /// `Null` or the variant matching `wire`.
    pub value: SqlValue,
}

/// Per-column view of a bound request, for stores that do not speak SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundColumn {
    pub column: String,
    pub value: SqlValue,
    pub supplied: bool,
    pub key: bool,
}

/// A template with concrete values for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub table: String,
    pub conflict_columns: Vec<String>,
    pub sql: Arc<str>,
    pub params: Vec<BoundParam>,
    pub columns: Vec<BoundColumn>,
}

impl BoundStatement {
    pub fn column(&self, name: &str) -> Option<&BoundColumn> {
        self.columns.iter().find(|c| c.column == name)
    }
}

/// Build the template for `constraint` on `table`.
pub fn build(
    table: &TableDescriptor,
    constraint: &UniqueConstraint,
) -> Result<StatementTemplate, StatementBuildError> {
    StatementTemplate::build(table, constraint)
}

impl StatementTemplate {
    pub fn build(
        table: &TableDescriptor,
        constraint: &UniqueConstraint,
    ) -> Result<Self, StatementBuildError> {
        if !table.owns_constraint(constraint) {
            return Err(StatementBuildError::UnknownConstraint {
                table: table.qualified_name(),
                columns: constraint.columns.clone(),
            });
        }

        let mut key_columns = Vec::with_capacity(constraint.columns.len());
        for name in &constraint.columns {
            let column = table
                .column(name)
                .ok_or_else(|| StatementBuildError::UnknownConstraint {
                    table: table.qualified_name(),
                    columns: constraint.columns.clone(),
                })?;
            key_columns.push(column);
        }
        let other_columns: Vec<&ColumnDescriptor> = table
            .writable_columns()
            .filter(|c| !constraint.contains(&c.name))
            .collect();

        let mut slots = Vec::with_capacity(key_columns.len() + other_columns.len());
        let mut insert_names = Vec::new();
        let mut insert_values = Vec::new();
        let mut assignments = Vec::new();
        let mut next_param = 1;

        for column in &key_columns {
            let ident = quote_ident(&column.name);
            insert_names.push(ident);
            insert_values.push(format!("${}{}", next_param, param_cast(column)));
            slots.push(ParamSlot {
                column: column.name.clone(),
                scalar: column.scalar,
                wire: column.scalar.wire_type(),
                value_param: next_param,
                flag_param: None,
            });
            next_param += 1;
        }

        for column in &other_columns {
            let (value_param, flag_param) = (next_param, next_param + 1);
            next_param += 2;

            let ident = quote_ident(&column.name);
            let fallback = column.default.as_deref().unwrap_or("NULL");
            insert_values.push(format!(
                "CASE WHEN ${flag}::bool THEN ${value}{cast} ELSE {fallback} END",
                flag = flag_param,
                value = value_param,
                cast = param_cast(column),
                fallback = fallback,
            ));
            assignments.push(format!(
                "{ident} = CASE WHEN ${flag}::bool THEN EXCLUDED.{ident} ELSE {alias}.{ident} END",
                ident = ident,
                flag = flag_param,
                alias = TARGET_ALIAS,
            ));
            insert_names.push(ident);
            slots.push(ParamSlot {
                column: column.name.clone(),
                scalar: column.scalar,
                wire: column.scalar.wire_type(),
                value_param,
                flag_param: Some(flag_param),
            });
        }

        if assignments.is_empty() {
            // DO NOTHING would suppress RETURNING on conflict.
            let ident = quote_ident(&constraint.columns[0]);
            assignments.push(format!("{ident} = EXCLUDED.{ident}", ident = ident));
        }

        let conflict_target = constraint
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {target} AS {alias} ({names}) VALUES ({values}) \
             ON CONFLICT ({conflict}) DO UPDATE SET {assignments} \
             RETURNING {returning}",
            target = qualified_target(table),
            alias = TARGET_ALIAS,
            names = insert_names.join(", "),
            values = insert_values.join(", "),
            conflict = conflict_target,
            assignments = assignments.join(", "),
            returning = returning_list(table),
        );

        Ok(Self {
            table: table.qualified_name(),
            conflict_columns: constraint.columns.clone(),
            sql: Arc::from(sql),
            slots,
            param_count: next_param - 1,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn conflict_columns(&self) -> &[String] {
        &self.conflict_columns
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Bind a request's values.
    ///
    /// The request's `where` keys must be exactly this template's conflict
    /// columns. `where` values win over `input` values for those columns.
    pub fn bind(
        &self,
        table: &TableDescriptor,
        request: &UpsertRequest,
    ) -> EngineResult<BoundStatement> {
        let expected: BTreeSet<&str> = self.conflict_columns.iter().map(String::as_str).collect();
        if table.qualified_name() != self.table || request.where_keys() != expected {
            return Err(StatementBuildError::ConstraintMismatch {
                table: self.table.clone(),
                expected: self.conflict_columns.clone(),
                got: request.where_values.keys().cloned().collect(),
            }
            .into());
        }

        validate_request(table, request)?;

        let mut params: Vec<Option<BoundParam>> = vec![None; self.param_count];
        let mut columns = Vec::with_capacity(self.slots.len());

        for slot in &self.slots {
            let (raw, supplied) = if slot.is_key() {
                let value = request.where_values.get(&slot.column).cloned().ok_or_else(|| {
                    ValidationError::NullKeyValue {
                        table: self.table.clone(),
                        column: slot.column.clone(),
                    }
                })?;
                (value, true)
            } else {
                match request.input.get(&slot.column) {
                    Some(value) => (value.clone(), true),
                    None => (SqlValue::Null, false),
                }
            };
            let value = raw.coerce(&slot.column, slot.scalar)?;
            if let Some(column) = table.column(&slot.column) {
                check_range(column, &value)?;
            }

            params[slot.value_param - 1] = Some(BoundParam {
                wire: slot.wire,
                value: value.clone(),
            });
            if let Some(flag) = slot.flag_param {
                params[flag - 1] = Some(BoundParam {
                    wire: WireType::Bool,
                    value: SqlValue::Bool(supplied),
                });
            }

            columns.push(BoundColumn {
                column: slot.column.clone(),
                value,
                supplied,
                key: slot.is_key(),
            });
        }

        Ok(BoundStatement {
            table: self.table.clone(),
            conflict_columns: self.conflict_columns.clone(),
            sql: Arc::clone(&self.sql),
            params: params.into_iter().flatten().collect(),
            columns,
        })
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// `SELECT` over every column of `table`, projected the same way as the
/// upsert's `RETURNING` list.
pub fn select_all(table: &TableDescriptor, order: &[OrderBy]) -> String {
    let mut sql = format!(
        "SELECT {} FROM {}",
        returning_list(table),
        qualified_target(table)
    );
    if !order.is_empty() {
        let terms = order
            .iter()
            .map(|o| {
                format!(
                    "{} {}",
                    quote_ident(&o.column),
                    if o.descending { "DESC" } else { "ASC" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms);
    }
    sql
}

fn qualified_target(table: &TableDescriptor) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

fn returning_list(table: &TableDescriptor) -> String {
    table
        .columns
        .iter()
        .map(|c| {
            let ident = quote_ident(&c.name);
            if projects_as_text(c) {
                format!("{ident}::text AS {ident}", ident = ident)
            } else {
                ident
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns whose catalog type the driver cannot decode directly.
fn projects_as_text(column: &ColumnDescriptor) -> bool {
    match column.scalar {
        ScalarType::Numeric => true,
        ScalarType::Text => !is_native_text(&column.sql_type),
        _ => false,
    }
}

fn param_cast(column: &ColumnDescriptor) -> String {
    let wire = column.scalar.wire_type();
    match wire {
        WireType::Text if column.scalar == ScalarType::Text && is_native_text(&column.sql_type) => {
            "::text".to_string()
        }
        WireType::Text => format!("::text::{}", column.sql_type),
        _ => format!("::{}", wire.cast()),
    }
}

fn is_native_text(sql_type: &str) -> bool {
    let lowered = sql_type.to_ascii_lowercase();
    let base = lowered.split('(').next().unwrap_or("").trim();
    matches!(
        base,
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpsertError;

    fn col(name: &str, sql_type: &str, scalar: ScalarType, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            scalar,
            nullable,
            default: None,
            writable: true,
        }
    }

    fn bikes() -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: "bikes".to_string(),
            columns: vec![
                ColumnDescriptor {
                    default: Some("nextval('bikes_id_seq'::regclass)".to_string()),
                    ..col("id", "integer", ScalarType::Integer, false)
                },
                col("serialNumber", "character varying", ScalarType::Text, false),
                col("weight", "real", ScalarType::Float, true),
                col("make", "character varying", ScalarType::Text, true),
                col("model", "character varying", ScalarType::Text, true),
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

    fn serial_constraint(table: &TableDescriptor) -> UniqueConstraint {
        table.constraints[1].clone()
    }

    #[test]
    fn test_build_renders_conflict_target_and_returning() -> Result<(), StatementBuildError> {
        let table = bikes();
        let template = build(&table, &serial_constraint(&table))?;
        let sql = template.sql();

        assert!(sql.starts_with("INSERT INTO \"public\".\"bikes\" AS \"__target\" (\"serialNumber\", \"id\", \"weight\", \"make\", \"model\")"));
        assert!(sql.contains("VALUES ($1::text, CASE WHEN $3::bool THEN $2::int8 ELSE nextval('bikes_id_seq'::regclass) END"));
        assert!(sql.contains("CASE WHEN $5::bool THEN $4::float8 ELSE NULL END"));
        assert!(sql.contains("ON CONFLICT (\"serialNumber\") DO UPDATE SET"));
        assert!(sql.contains(
            "\"make\" = CASE WHEN $7::bool THEN EXCLUDED.\"make\" ELSE \"__target\".\"make\" END"
        ));
        assert!(sql.ends_with("RETURNING \"id\", \"serialNumber\", \"weight\", \"make\", \"model\""));
        assert_eq!(template.param_count(), 9);
        Ok(())
    }

    #[test]
    fn test_conflict_columns_are_never_assigned() -> Result<(), StatementBuildError> {
        let table = bikes();
        let template = build(&table, &serial_constraint(&table))?;
        let set_clause = template
            .sql()
            .split("DO UPDATE SET")
            .nth(1)
            .unwrap_or_default()
            .to_string();
        assert!(!set_clause.contains("\"serialNumber\" ="));
        Ok(())
    }

    #[test]
    fn test_build_rejects_foreign_constraint() {
        let table = bikes();
        let foreign = UniqueConstraint {
            name: "bikes_make_key".to_string(),
            columns: vec!["make".to_string()],
            primary: false,
        };
        assert_eq!(
            build(&table, &foreign),
            Err(StatementBuildError::UnknownConstraint {
                table: "public.bikes".to_string(),
                columns: vec!["make".to_string()],
            })
        );
    }

    #[test]
    fn test_key_only_table_gets_noop_update() -> Result<(), StatementBuildError> {
        let table = TableDescriptor {
            schema: "public".to_string(),
            name: "tags".to_string(),
            columns: vec![col("label", "text", ScalarType::Text, false)],
            constraints: vec![UniqueConstraint {
                name: "tags_pkey".to_string(),
                columns: vec!["label".to_string()],
                primary: true,
            }],
        };
        let template = build(&table, &table.constraints[0])?;
        assert!(template
            .sql()
            .contains("DO UPDATE SET \"label\" = EXCLUDED.\"label\""));
        assert_eq!(template.param_count(), 1);
        Ok(())
    }

    #[test]
    fn test_bind_where_wins_over_input() -> Result<(), UpsertError> {
        let table = bikes();
        let template = build(&table, &serial_constraint(&table))?;
        let request = UpsertRequest::new()
            .with_where("serialNumber", "abc123")
            .with_input("serialNumber", "other")
            .with_input("make", "kona");

        let bound = template.bind(&table, &request)?;
        assert_eq!(bound.params[0].value, SqlValue::from("abc123"));
        assert_eq!(
            bound.column("serialNumber").map(|c| c.value.clone()),
            Some(SqlValue::from("abc123"))
        );
        Ok(())
    }

    #[test]
    fn test_bind_flags_track_supplied_columns() -> Result<(), UpsertError> {
        let table = bikes();
        let template = build(&table, &serial_constraint(&table))?;
        let request = UpsertRequest::new()
            .with_where("serialNumber", "abc123")
            .with_input("weight", 25i64)
            .with_input("model", SqlValue::Null);

        let bound = template.bind(&table, &request)?;
        assert_eq!(bound.params.len(), template.param_count());

        // id: not supplied
        assert_eq!(bound.params[1].value, SqlValue::Null);
        assert_eq!(bound.params[2].value, SqlValue::Bool(false));
        // weight: supplied and widened to float
        assert_eq!(bound.params[3].value, SqlValue::Float(25.0));
        assert_eq!(bound.params[4].value, SqlValue::Bool(true));
        // model: explicitly nulled
        assert_eq!(bound.params[7].value, SqlValue::Null);
        assert_eq!(bound.params[8].value, SqlValue::Bool(true));
        Ok(())
    }

    #[test]
    fn test_bind_empty_input_is_well_formed() -> Result<(), UpsertError> {
        let table = bikes();
        let template = build(&table, &serial_constraint(&table))?;
        let request = UpsertRequest::new().with_where("serialNumber", "abc123");

        let bound = template.bind(&table, &request)?;
        assert_eq!(bound.params.len(), 9);
        assert!(bound.columns.iter().filter(|c| !c.key).all(|c| !c.supplied));
        Ok(())
    }

    #[test]
    fn test_bind_rejects_integer_overflow() -> Result<(), UpsertError> {
        let table = bikes();
        let template = build(&table, &table.constraints[0])?;

        let too_big = UpsertRequest::new()
            .with_where("id", i64::from(i32::MAX) + 1)
            .with_input("serialNumber", "abc123");
        assert!(matches!(
            template.bind(&table, &too_big),
            Err(UpsertError::Validation(ValidationError::OutOfRange { value: 2147483648, .. }))
        ));

        let fits = UpsertRequest::new()
            .with_where("id", i64::from(i32::MIN))
            .with_input("serialNumber", "abc123");
        assert!(template.bind(&table, &fits).is_ok());
        Ok(())
    }

    #[test]
    fn test_int_bounds_follow_sql_type() {
        let small = col("n", "smallint", ScalarType::Integer, true);
        let big = col("n", "bigint", ScalarType::BigInt, true);
        assert_eq!(small.int_bounds(), Some((-32768, 32767)));
        assert_eq!(big.int_bounds(), None);
    }

    #[test]
    fn test_bind_rejects_where_for_other_constraint() -> Result<(), UpsertError> {
        let table = bikes();
        let template = build(&table, &serial_constraint(&table))?;
        let request = UpsertRequest::new()
            .with_where("id", 1i64)
            .with_input("serialNumber", "abc123");

        assert!(matches!(
            template.bind(&table, &request),
            Err(UpsertError::Statement(StatementBuildError::ConstraintMismatch { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_param_casts_for_non_text_types() {
        let numeric = col("price", "numeric(10,2)", ScalarType::Numeric, true);
        let mood = col("mood", "mood", ScalarType::Text, true);
        let stamp = col("seen", "timestamp with time zone", ScalarType::Timestamp, true);
        assert_eq!(param_cast(&numeric), "::text::numeric(10,2)");
        assert_eq!(param_cast(&mood), "::text::mood");
        assert_eq!(param_cast(&stamp), "::text::timestamp with time zone");
        assert!(projects_as_text(&numeric));
        assert!(projects_as_text(&mood));
        assert!(!projects_as_text(&stamp));
    }

    #[test]
    fn test_select_all_with_order() {
        let table = bikes();
        let sql = select_all(
            &table,
            &[OrderBy {
                column: "serialNumber".to_string(),
                descending: false,
            }],
        );
        assert!(sql.starts_with("SELECT \"id\", \"serialNumber\""));
        assert!(sql.ends_with("FROM \"public\".\"bikes\" ORDER BY \"serialNumber\" ASC"));
    }
}
