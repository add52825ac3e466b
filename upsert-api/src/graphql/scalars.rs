//! Scalar mapping between column types and GraphQL values.

use async_graphql::dynamic::{Scalar, TypeRef};
use async_graphql::{Number, Value as GqlValue};

use upsert_core::{ScalarType, SqlValue};

pub const BIG_INT: &str = "BigInt";
pub const BIG_FLOAT: &str = "BigFloat";
pub const UUID: &str = "UUID";
pub const DATE: &str = "Date";
pub const DATETIME: &str = "Datetime";
pub const JSON: &str = "JSON";

/// Custom scalars registered on every schema.
pub fn custom_scalars() -> Vec<Scalar> {
    vec![
        Scalar::new(BIG_INT)
            .description("A signed eight-byte integer, serialized as a string."),
        Scalar::new(BIG_FLOAT)
            .description("An arbitrary precision decimal, serialized as a string."),
        Scalar::new(UUID).description("A universally unique identifier (RFC 4122)."),
        Scalar::new(DATE).description("A calendar date, `YYYY-MM-DD`."),
        Scalar::new(DATETIME).description("A point in time as an ISO 8601 string."),
        Scalar::new(JSON).description("A JSON value."),
    ]
}

pub fn type_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Text => TypeRef::STRING,
        ScalarType::Integer => TypeRef::INT,
        ScalarType::BigInt => BIG_INT,
        ScalarType::Float => TypeRef::FLOAT,
        ScalarType::Numeric => BIG_FLOAT,
        ScalarType::Boolean => TypeRef::BOOLEAN,
        ScalarType::Uuid => UUID,
        ScalarType::Date => DATE,
        ScalarType::Timestamp => DATETIME,
        ScalarType::Json => JSON,
    }
}

/// Output type for a column: non-null unless the column is nullable.
pub fn output_type(scalar: ScalarType, nullable: bool) -> TypeRef {
    if nullable {
        TypeRef::named(type_name(scalar))
    } else {
        TypeRef::named_nn(type_name(scalar))
    }
}

/// Convert an argument value. Column coercion happens later in the engine;
/// this only picks the closest [`SqlValue`] variant.
///
/// `JSON` accepts either a structured value or a string holding a JSON
/// document. A string that is not valid JSON is kept as a JSON string.
pub fn from_graphql(scalar: ScalarType, value: &GqlValue) -> SqlValue {
    match (scalar, value) {
        (_, GqlValue::Null) => SqlValue::Null,
        (ScalarType::Json, GqlValue::String(s)) => match serde_json::from_str(s) {
            Ok(json) => SqlValue::Json(json),
            Err(_) => SqlValue::Text(s.clone()),
        },
        (ScalarType::Json, other) => match other.clone().into_json() {
            Ok(json) => SqlValue::Json(json),
            Err(_) => SqlValue::Text(other.to_string()),
        },
        (_, GqlValue::Boolean(b)) => SqlValue::Bool(*b),
        (_, GqlValue::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        (_, GqlValue::String(s)) => SqlValue::Text(s.clone()),
        (_, GqlValue::Enum(name)) => SqlValue::Text(name.to_string()),
        (_, other) => match other.clone().into_json() {
            Ok(json) => SqlValue::Json(json),
            Err(_) => SqlValue::Text(other.to_string()),
        },
    }
}

/// Convert a stored value for output as `scalar`.
pub fn to_graphql(scalar: ScalarType, value: &SqlValue) -> GqlValue {
    match (scalar, value) {
        (_, SqlValue::Null) => GqlValue::Null,
        (ScalarType::BigInt, SqlValue::Int(i)) => GqlValue::String(i.to_string()),
        (ScalarType::Numeric, SqlValue::Int(i)) => GqlValue::String(i.to_string()),
        (ScalarType::Numeric, SqlValue::Float(f)) => GqlValue::String(f.to_string()),
        (ScalarType::Json, SqlValue::Text(s)) => match serde_json::from_str(s) {
            Ok(json) => json_value(json, s),
            Err(_) => GqlValue::String(s.clone()),
        },
        (_, SqlValue::Bool(b)) => GqlValue::Boolean(*b),
        (_, SqlValue::Int(i)) => GqlValue::Number((*i).into()),
        (_, SqlValue::Float(f)) => match Number::from_f64(*f) {
            Some(n) => GqlValue::Number(n),
            None => GqlValue::String(f.to_string()),
        },
        (_, SqlValue::Text(s)) => GqlValue::String(s.clone()),
        (_, SqlValue::Json(json)) => json_value(json.clone(), &json.to_string()),
    }
}

fn json_value(json: serde_json::Value, raw: &str) -> GqlValue {
    GqlValue::from_json(json).unwrap_or_else(|_| GqlValue::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(ScalarType::Text), "String");
        assert_eq!(type_name(ScalarType::Float), "Float");
        assert_eq!(type_name(ScalarType::BigInt), "BigInt");
        assert_eq!(type_name(ScalarType::Timestamp), "Datetime");
        assert_eq!(output_type(ScalarType::Integer, false).to_string(), "Int!");
        assert_eq!(output_type(ScalarType::Integer, true).to_string(), "Int");
    }

    #[test]
    fn test_from_graphql_numbers() {
        let int = GqlValue::Number(200.into());
        assert_eq!(from_graphql(ScalarType::Float, &int), SqlValue::Int(200));
        let float = GqlValue::from_json(serde_json::json!(25.6)).unwrap();
        assert_eq!(from_graphql(ScalarType::Float, &float), SqlValue::Float(25.6));
    }

    #[test]
    fn test_from_graphql_json() {
        let doc = GqlValue::String("{\"speeds\":12}".to_string());
        assert_eq!(
            from_graphql(ScalarType::Json, &doc),
            SqlValue::Json(serde_json::json!({"speeds": 12}))
        );
        let plain = GqlValue::String("not json".to_string());
        assert_eq!(from_graphql(ScalarType::Json, &plain), SqlValue::from("not json"));
        let structured = GqlValue::from_json(serde_json::json!({"a": [1, 2]})).unwrap();
        assert_eq!(
            from_graphql(ScalarType::Json, &structured),
            SqlValue::Json(serde_json::json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn test_to_graphql() {
        assert_eq!(
            to_graphql(ScalarType::BigInt, &SqlValue::Int(9_007_199_254_740_993)),
            GqlValue::String("9007199254740993".to_string())
        );
        assert_eq!(
            to_graphql(ScalarType::Json, &SqlValue::from("{\"speeds\":12}")),
            GqlValue::from_json(serde_json::json!({"speeds": 12})).unwrap()
        );
        assert_eq!(to_graphql(ScalarType::Text, &SqlValue::Null), GqlValue::Null);
        assert_eq!(
            to_graphql(ScalarType::Integer, &SqlValue::Int(3)),
            GqlValue::Number(3.into())
        );
    }
}
