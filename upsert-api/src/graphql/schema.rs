//! Dynamic schema assembly.
//!
//! Every [`MutationField`] contributes a row object, the upsert input and
//! payload types, and a connection for `all<Types>`. The schema is built once
//! at startup and is immutable afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_graphql::dynamic::{
    Enum, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ObjectAccessor,
    ResolverContext, Schema, TypeRef,
};
use async_graphql::{ErrorExtensions, Value as GqlValue};
use tracing::{debug, instrument};

use upsert_core::naming::order_value;
use upsert_core::{MutationField, OrderBy, Row, UpsertRequest, UpsertResult};
use upsert_storage::UpsertEngine;

use super::scalars;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::telemetry::METRICS;

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";
const NATURAL: &str = "NATURAL";
const CLIENT_MUTATION_ID: &str = "clientMutationId";

/// Rows returned by `all<Types>`.
struct Connection {
    rows: Vec<Row>,
}

/// Build the executable schema for `fields`.
///
/// The engine is attached as schema data and reached from resolvers. When no
/// table is exposed the schema has no mutation root.
pub fn build_schema(fields: &[MutationField], engine: Arc<UpsertEngine>) -> ApiResult<Schema> {
    let mut query = Object::new(QUERY).field(Field::new(
        "query",
        TypeRef::named_nn(QUERY),
        |_| FieldFuture::new(async { Ok(Some(FieldValue::owned_any(()))) }),
    ));
    let mut mutation = Object::new(MUTATION);

    let mut objects = Vec::new();
    let mut inputs = Vec::new();
    let mut enums = Vec::new();

    for field in fields {
        let field = Arc::new(field.clone());
        debug!(table = %field.table.qualified_name(), mutation = %field.field_name, "Exposing table");

        objects.push(row_object(&field));
        objects.push(payload_object(&field));
        objects.push(connection_object(&field));
        objects.push(edge_object(&field));
        inputs.push(row_input(&field));
        inputs.push(where_input(&field));
        inputs.push(upsert_input(&field));
        enums.push(order_enum(&field));

        mutation = mutation.field(upsert_field(field.clone()));
        query = query.field(all_field(field));
    }

    let mut builder = Schema::build(
        QUERY,
        if fields.is_empty() { None } else { Some(MUTATION) },
        None,
    )
    .register(query);
    if !fields.is_empty() {
        builder = builder.register(mutation);
    }
    for scalar in scalars::custom_scalars() {
        builder = builder.register(scalar);
    }
    for object in objects {
        builder = builder.register(object);
    }
    for input in inputs {
        builder = builder.register(input);
    }
    for order in enums {
        builder = builder.register(order);
    }

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.set_schema_tables(fields.len());
    }

    builder
        .data(engine)
        .finish()
        .map_err(|e| ApiError::internal_error(format!("Failed to build GraphQL schema: {}", e)))
}

// ============================================================================
// OUTPUT TYPES
// ============================================================================

fn row_object(field: &MutationField) -> Object {
    let mut object = Object::new(&field.type_name)
        .description(format!("A row of `{}`.", field.table.qualified_name()));

    for binding in &field.columns {
        let column = binding.column.clone();
        let scalar = binding.scalar;
        object = object.field(Field::new(
            &binding.field,
            scalars::output_type(binding.scalar, binding.nullable),
            move |ctx| {
                let column = column.clone();
                FieldFuture::new(async move {
                    let row = ctx.parent_value.try_downcast_ref::<Row>()?;
                    Ok(Some(FieldValue::value(scalars::to_graphql(
                        scalar,
                        row.value(&column),
                    ))))
                })
            },
        ));
    }
    object
}

fn payload_object(field: &MutationField) -> Object {
    Object::new(field.payload_type())
        .field(Field::new(CLIENT_MUTATION_ID, TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let result = ctx.parent_value.try_downcast_ref::<UpsertResult>()?;
                Ok(result
                    .client_mutation_id
                    .clone()
                    .map(|id| FieldValue::value(GqlValue::String(id))))
            })
        }))
        .field(Field::new(
            &field.row_field,
            TypeRef::named(&field.type_name),
            |ctx| {
                FieldFuture::new(async move {
                    let result = ctx.parent_value.try_downcast_ref::<UpsertResult>()?;
                    Ok(Some(FieldValue::owned_any(result.row.clone())))
                })
            },
        ))
        .field(Field::new("query", TypeRef::named(QUERY), |_| {
            FieldFuture::new(async { Ok(Some(FieldValue::owned_any(()))) })
        }))
}

fn connection_object(field: &MutationField) -> Object {
    Object::new(field.connection_type())
        .field(Field::new(
            "nodes",
            TypeRef::named_list_nn(&field.type_name),
            |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<Connection>()?;
                    Ok(Some(FieldValue::list(
                        connection.rows.iter().cloned().map(FieldValue::owned_any),
                    )))
                })
            },
        ))
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list_nn(field.edge_type()),
            |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<Connection>()?;
                    Ok(Some(FieldValue::list(
                        connection.rows.iter().cloned().map(FieldValue::owned_any),
                    )))
                })
            },
        ))
        .field(Field::new("totalCount", TypeRef::named_nn(TypeRef::INT), |ctx| {
            FieldFuture::new(async move {
                let connection = ctx.parent_value.try_downcast_ref::<Connection>()?;
                Ok(Some(FieldValue::value(GqlValue::from(connection.rows.len() as i32))))
            })
        }))
}

fn edge_object(field: &MutationField) -> Object {
    Object::new(field.edge_type()).field(Field::new(
        "node",
        TypeRef::named(&field.type_name),
        |ctx| {
            FieldFuture::new(async move {
                let row = ctx.parent_value.try_downcast_ref::<Row>()?;
                Ok(Some(FieldValue::owned_any(row.clone())))
            })
        },
    ))
}

fn order_enum(field: &MutationField) -> Enum {
    let mut order = Enum::new(field.order_type()).item(NATURAL);
    for binding in &field.columns {
        order = order
            .item(order_value(&binding.column, false))
            .item(order_value(&binding.column, true));
    }
    order
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Writable columns, all optional: key columns may come from `where`, and
/// required columns are checked by the engine after merging.
fn row_input(field: &MutationField) -> InputObject {
    field.writable_bindings().fold(
        InputObject::new(field.row_input_type()),
        |input, binding| {
            input.field(InputValue::new(
                &binding.field,
                TypeRef::named(scalars::type_name(binding.scalar)),
            ))
        },
    )
}

fn where_input(field: &MutationField) -> InputObject {
    field.key_bindings().fold(
        InputObject::new(field.where_type()).description(
            "Columns of exactly one primary key or unique constraint of the table.",
        ),
        |input, binding| {
            input.field(InputValue::new(
                &binding.field,
                TypeRef::named(scalars::type_name(binding.scalar)),
            ))
        },
    )
}

fn upsert_input(field: &MutationField) -> InputObject {
    InputObject::new(field.input_type())
        .field(InputValue::new(CLIENT_MUTATION_ID, TypeRef::named(TypeRef::STRING)))
        .field(InputValue::new(
            &field.row_field,
            TypeRef::named_nn(field.row_input_type()),
        ))
}

// ============================================================================
// ROOT FIELDS
// ============================================================================

fn upsert_field(field: Arc<MutationField>) -> Field {
    let name = field.field_name.clone();
    let payload = field.payload_type();
    let where_type = field.where_type();
    let input_type = field.input_type();
    let description = format!(
        "Insert a `{}` row, or update the row matching `where` on conflict.",
        field.table.qualified_name()
    );

    Field::new(name, TypeRef::named(payload), move |ctx| {
        let field = field.clone();
        FieldFuture::new(async move {
            let engine = ctx.data::<Arc<UpsertEngine>>()?;
            let request = request_from_args(&field, &ctx.args).map_err(|e| e.extend())?;
            let result = run_upsert(engine, &field, &request)
                .await
                .map_err(|e| e.extend())?;
            Ok(Some(FieldValue::owned_any(result)))
        })
    })
    .description(description)
    .argument(InputValue::new("where", TypeRef::named_nn(where_type)))
    .argument(InputValue::new("input", TypeRef::named_nn(input_type)))
}

fn all_field(field: Arc<MutationField>) -> Field {
    let name = field.all_field();
    let connection = field.connection_type();
    let order_type = field.order_type();

    let mut order_lookup: HashMap<String, OrderBy> = HashMap::new();
    for binding in &field.columns {
        for descending in [false, true] {
            order_lookup.insert(
                order_value(&binding.column, descending),
                OrderBy {
                    column: binding.column.clone(),
                    descending,
                },
            );
        }
    }
    let order_lookup = Arc::new(order_lookup);

    Field::new(name, TypeRef::named_nn(connection), move |ctx| {
        let field = field.clone();
        let order_lookup = order_lookup.clone();
        FieldFuture::new(async move {
            let engine = ctx.data::<Arc<UpsertEngine>>()?;
            let order = order_from_args(&ctx, &order_lookup)?;
            let rows = engine
                .list(&field.table, &order)
                .await
                .map_err(|e| ApiError::from(e).extend())?;
            Ok(Some(FieldValue::owned_any(Connection { rows })))
        })
    })
    .description("Reads rows of the table.")
    .argument(InputValue::new(
        "orderBy",
        TypeRef::named_nn_list(order_type),
    ))
}

fn order_from_args(
    ctx: &ResolverContext<'_>,
    lookup: &HashMap<String, OrderBy>,
) -> async_graphql::Result<Vec<OrderBy>> {
    let Some(values) = ctx.args.get("orderBy") else {
        return Ok(Vec::new());
    };
    if values.is_null() {
        return Ok(Vec::new());
    }

    // A lone enum value coerces to a one-element list.
    let names: Vec<String> = match values.list() {
        Ok(list) => list
            .iter()
            .map(|v| v.enum_name().map(str::to_string))
            .collect::<async_graphql::Result<_>>()?,
        Err(_) => vec![values.enum_name()?.to_string()],
    };

    let mut order = Vec::new();
    for name in &names {
        if name == NATURAL {
            continue;
        }
        match lookup.get(name) {
            Some(entry) => order.push(entry.clone()),
            None => {
                return Err(ApiError::invalid_input(format!("Unknown ordering {}", name)).extend())
            }
        }
    }
    Ok(order)
}

// ============================================================================
// REQUEST MAPPING
// ============================================================================

fn argument_error(e: async_graphql::Error) -> ApiError {
    ApiError::invalid_input(e.message)
}

/// Map `where` and `input` arguments onto column names.
fn request_from_args(field: &MutationField, args: &ObjectAccessor<'_>) -> ApiResult<UpsertRequest> {
    let mut request = UpsertRequest::new();

    let where_arg = args.try_get("where").map_err(argument_error)?;
    let where_obj = where_arg.object().map_err(argument_error)?;
    let mut keys = Vec::new();
    for (name, value) in where_obj.iter() {
        let binding = field.binding_for_field(name.as_str()).ok_or_else(|| {
            unknown_field(field, name.as_str())
        })?;
        keys.push((
            binding.column.clone(),
            scalars::from_graphql(binding.scalar, value.as_value()),
        ));
    }
    // Null key fields are treated as absent once any key field carries a value.
    if keys.iter().any(|(_, v)| !v.is_null()) {
        keys.retain(|(_, v)| !v.is_null());
    }
    request.where_values.extend(keys);

    let input_arg = args.try_get("input").map_err(argument_error)?;
    let input = input_arg.object().map_err(argument_error)?;
    if let Some(id) = input.get(CLIENT_MUTATION_ID) {
        if !id.is_null() {
            request.client_mutation_id = Some(id.string().map_err(argument_error)?.to_string());
        }
    }

    let row_arg = input.try_get(&field.row_field).map_err(argument_error)?;
    let row = row_arg.object().map_err(argument_error)?;
    for (name, value) in row.iter() {
        let binding = field.binding_for_field(name.as_str()).ok_or_else(|| {
            unknown_field(field, name.as_str())
        })?;
        request.input.insert(
            binding.column.clone(),
            scalars::from_graphql(binding.scalar, value.as_value()),
        );
    }

    Ok(request)
}

fn unknown_field(field: &MutationField, name: &str) -> ApiError {
    ApiError::new(
        ErrorCode::UnknownColumn,
        format!("Field {} does not exist on {}", name, field.type_name),
    )
    .with_details(serde_json::json!({ "column": name }))
}

#[instrument(skip_all, fields(table = %field.table.qualified_name()))]
async fn run_upsert(
    engine: &UpsertEngine,
    field: &MutationField,
    request: &UpsertRequest,
) -> ApiResult<UpsertResult> {
    let table = field.table.qualified_name();
    let started = Instant::now();
    let result = engine.upsert(&field.table, request).await.map_err(ApiError::from);

    if let Ok(metrics) = METRICS.as_ref() {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code.as_str(),
        };
        metrics.record_upsert(&table, outcome, started.elapsed().as_secs_f64());
    }
    if let Err(e) = &result {
        debug!(table = %table, code = e.code.as_str(), error = %e.message, "Upsert rejected");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use upsert_core::{synthesize, ColumnDescriptor, ScalarType, TableDescriptor, UniqueConstraint};

    fn bikes() -> MutationField {
        let column = |name: &str, scalar, nullable| ColumnDescriptor {
            name: name.to_string(),
            sql_type: "text".to_string(),
            scalar,
            nullable,
            default: None,
            writable: true,
        };
        let table = TableDescriptor {
            schema: "public".to_string(),
            name: "bikes".to_string(),
            columns: vec![
                ColumnDescriptor {
                    default: Some("nextval('bikes_id_seq'::regclass)".to_string()),
                    ..column("id", ScalarType::Integer, false)
                },
                column("serial_number", ScalarType::Text, false),
                column("weight", ScalarType::Float, true),
            ],
            constraints: vec![
                UniqueConstraint {
                    name: "bikes_pkey".to_string(),
                    columns: vec!["id".to_string()],
                    primary: true,
                },
                UniqueConstraint {
                    name: "bikes_serial_number_key".to_string(),
                    columns: vec!["serial_number".to_string()],
                    primary: false,
                },
            ],
        };
        match synthesize(&table) {
            Ok(field) => field,
            Err(e) => panic!("synthesize failed: {}", e),
        }
    }

    #[test]
    fn test_order_enum_lists_every_column() {
        let field = bikes();
        let lookup_names: Vec<String> = field
            .columns
            .iter()
            .flat_map(|b| [order_value(&b.column, false), order_value(&b.column, true)])
            .collect();
        assert!(lookup_names.contains(&"SERIAL_NUMBER_ASC".to_string()));
        assert!(lookup_names.contains(&"WEIGHT_DESC".to_string()));
        assert_eq!(field.order_type(), "BikesOrderBy");
    }

    #[test]
    fn test_unknown_field_error() {
        let err = unknown_field(&bikes(), "colour");
        assert_eq!(err.code, ErrorCode::UnknownColumn);
        assert!(err.message.contains("colour"));
    }
}
