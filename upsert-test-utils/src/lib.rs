//! Upsert Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Table fixtures (`bikes`, `parts`) in raw and normalized form
//! - Proptest generators for descriptors and values
//! - An engine wired to the in-memory row store

use std::sync::Arc;

use proptest::prelude::*;

// Re-export the in-memory store from its source crate
pub use upsert_storage::{MemoryStore, RowStore, UpsertEngine};

pub use upsert_core::{
    ColumnDescriptor, IdentityKind, RawColumn, RawConstraint, RawTable, Row, ScalarType,
    SqlValue, TableDescriptor, UniqueConstraint, UpsertRequest,
};

// ============================================================================
// FIXTURES
// ============================================================================

fn raw_column(name: &str, data_type: &str, not_null: bool) -> RawColumn {
    RawColumn {
        name: name.to_string(),
        data_type: data_type.to_string(),
        not_null,
        default: None,
        identity: None,
        generated: false,
        is_enum: false,
    }
}

/// `public.bikes`: serial `id` primary key, unique `serialNumber`.
pub fn bikes_raw() -> RawTable {
    RawTable {
        schema: "public".to_string(),
        name: "bikes".to_string(),
        columns: vec![
            RawColumn {
                default: Some("nextval('bikes_id_seq'::regclass)".to_string()),
                ..raw_column("id", "integer", true)
            },
            raw_column("serialNumber", "character varying", true),
            raw_column("weight", "real", false),
            raw_column("make", "character varying", false),
            raw_column("model", "character varying", false),
        ],
        constraints: vec![
            RawConstraint {
                name: "bikes_pkey".to_string(),
                columns: vec!["id".to_string()],
                primary: true,
            },
            RawConstraint {
                name: "bikes_serialNumber_key".to_string(),
                columns: vec!["serialNumber".to_string()],
                primary: false,
            },
        ],
    }
}

/// `public.parts`: serial `id` primary key, composite unique `(vendor, sku)`,
/// a defaulted `stock` and a jsonb `specs` column.
pub fn parts_raw() -> RawTable {
    RawTable {
        schema: "public".to_string(),
        name: "parts".to_string(),
        columns: vec![
            RawColumn {
                default: Some("nextval('parts_id_seq'::regclass)".to_string()),
                ..raw_column("id", "bigint", true)
            },
            raw_column("vendor", "text", true),
            raw_column("sku", "text", true),
            RawColumn {
                default: Some("0".to_string()),
                ..raw_column("stock", "integer", true)
            },
            raw_column("price", "numeric(10,2)", false),
            raw_column("specs", "jsonb", false),
        ],
        constraints: vec![
            RawConstraint {
                name: "parts_pkey".to_string(),
                columns: vec!["id".to_string()],
                primary: true,
            },
            RawConstraint {
                name: "parts_vendor_sku_key".to_string(),
                columns: vec!["vendor".to_string(), "sku".to_string()],
                primary: false,
            },
        ],
    }
}

fn column(name: &str, sql_type: &str, scalar: ScalarType, nullable: bool) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        scalar,
        nullable,
        default: None,
        writable: true,
    }
}

/// Normalized form of [`bikes_raw`].
pub fn bikes_table() -> TableDescriptor {
    TableDescriptor {
        schema: "public".to_string(),
        name: "bikes".to_string(),
        columns: vec![
            ColumnDescriptor {
                default: Some("nextval('bikes_id_seq'::regclass)".to_string()),
                ..column("id", "integer", ScalarType::Integer, false)
            },
            column("serialNumber", "character varying", ScalarType::Text, false),
            column("weight", "real", ScalarType::Float, true),
            column("make", "character varying", ScalarType::Text, true),
            column("model", "character varying", ScalarType::Text, true),
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

/// Normalized form of [`parts_raw`].
pub fn parts_table() -> TableDescriptor {
    TableDescriptor {
        schema: "public".to_string(),
        name: "parts".to_string(),
        columns: vec![
            ColumnDescriptor {
                default: Some("nextval('parts_id_seq'::regclass)".to_string()),
                ..column("id", "bigint", ScalarType::BigInt, false)
            },
            column("vendor", "text", ScalarType::Text, false),
            column("sku", "text", ScalarType::Text, false),
            ColumnDescriptor {
                default: Some("0".to_string()),
                ..column("stock", "integer", ScalarType::Integer, false)
            },
            column("price", "numeric(10,2)", ScalarType::Numeric, true),
            column("specs", "jsonb", ScalarType::Json, true),
        ],
        constraints: vec![
            UniqueConstraint {
                name: "parts_pkey".to_string(),
                columns: vec!["id".to_string()],
                primary: true,
            },
            UniqueConstraint {
                name: "parts_vendor_sku_key".to_string(),
                columns: vec!["vendor".to_string(), "sku".to_string()],
                primary: false,
            },
        ],
    }
}

/// Engine over a fresh in-memory store; the store handle is returned for
/// direct inspection.
pub fn memory_engine() -> (Arc<MemoryStore>, UpsertEngine) {
    let store = Arc::new(MemoryStore::new());
    let engine = UpsertEngine::new(store.clone());
    (store, engine)
}

/// The three bikes used across scenario tests.
pub fn bike_requests() -> Vec<UpsertRequest> {
    vec![
        UpsertRequest::new()
            .with_where("serialNumber", "abc123")
            .with_input("make", "kona")
            .with_input("model", "kula deluxe")
            .with_input("weight", 25.6),
        UpsertRequest::new()
            .with_where("serialNumber", "def456")
            .with_input("make", "honda")
            .with_input("model", "cbr")
            .with_input("weight", 200.0),
        UpsertRequest::new()
            .with_where("serialNumber", "ghi789")
            .with_input("make", "schwinn")
            .with_input("model", "stingray"),
    ]
}

// ============================================================================
// GENERATORS
// ============================================================================

pub fn arb_scalar_type() -> impl Strategy<Value = ScalarType> {
    prop_oneof![
        Just(ScalarType::Text),
        Just(ScalarType::Integer),
        Just(ScalarType::BigInt),
        Just(ScalarType::Float),
        Just(ScalarType::Numeric),
        Just(ScalarType::Boolean),
        Just(ScalarType::Uuid),
        Just(ScalarType::Date),
        Just(ScalarType::Timestamp),
        Just(ScalarType::Json),
    ]
}

/// A value that coerces cleanly into a column of `scalar` type.
pub fn arb_value_for(scalar: ScalarType) -> BoxedStrategy<SqlValue> {
    match scalar {
        ScalarType::Text => "[a-zA-Z0-9 ]{0,16}".prop_map(SqlValue::Text).boxed(),
        ScalarType::Integer => (-100_000i64..100_000).prop_map(SqlValue::Int).boxed(),
        ScalarType::BigInt => any::<i64>().prop_map(SqlValue::Int).boxed(),
        ScalarType::Float => (-1.0e6f64..1.0e6).prop_map(SqlValue::Float).boxed(),
        ScalarType::Numeric => (0i64..1_000_000)
            .prop_map(|cents| SqlValue::Text(format!("{}.{:02}", cents / 100, cents % 100)))
            .boxed(),
        ScalarType::Boolean => any::<bool>().prop_map(SqlValue::Bool).boxed(),
        ScalarType::Uuid => any::<u128>()
            .prop_map(|n| {
                let hex = format!("{:032x}", n);
                SqlValue::Text(format!(
                    "{}-{}-{}-{}-{}",
                    &hex[0..8],
                    &hex[8..12],
                    &hex[12..16],
                    &hex[16..20],
                    &hex[20..32]
                ))
            })
            .boxed(),
        ScalarType::Date => (1970i32..2100, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| SqlValue::Text(format!("{:04}-{:02}-{:02}", y, m, d)))
            .boxed(),
        ScalarType::Timestamp => (1970i32..2100, 1u32..=12, 1u32..=28, 0u32..24)
            .prop_map(|(y, m, d, h)| {
                SqlValue::Text(format!("{:04}-{:02}-{:02}T{:02}:00:00Z", y, m, d, h))
            })
            .boxed(),
        ScalarType::Json => (any::<bool>(), "[a-z]{1,6}", any::<i32>())
            .prop_map(|(flag, key, n)| SqlValue::Json(serde_json::json!({ key: n, "flag": flag })))
            .boxed(),
    }
}

/// A table with a single-column primary key `id` plus 1-5 extra nullable
/// columns of arbitrary type, the first of which is also unique.
pub fn arb_table_descriptor() -> impl Strategy<Value = TableDescriptor> {
    prop::collection::vec(arb_scalar_type(), 1..=5).prop_map(|scalars| {
        let mut columns = vec![column("id", "bigint", ScalarType::BigInt, false)];
        for (i, scalar) in scalars.into_iter().enumerate() {
            columns.push(column(&format!("c{}", i), sql_type_for(scalar), scalar, true));
        }
        TableDescriptor {
            schema: "public".to_string(),
            name: "things".to_string(),
            columns,
            constraints: vec![
                UniqueConstraint {
                    name: "things_pkey".to_string(),
                    columns: vec!["id".to_string()],
                    primary: true,
                },
                UniqueConstraint {
                    name: "things_c0_key".to_string(),
                    columns: vec!["c0".to_string()],
                    primary: false,
                },
            ],
        }
    })
}

pub fn sql_type_for(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Text => "text",
        ScalarType::Integer => "integer",
        ScalarType::BigInt => "bigint",
        ScalarType::Float => "double precision",
        ScalarType::Numeric => "numeric",
        ScalarType::Boolean => "boolean",
        ScalarType::Uuid => "uuid",
        ScalarType::Date => "date",
        ScalarType::Timestamp => "timestamp with time zone",
        ScalarType::Json => "jsonb",
    }
}
