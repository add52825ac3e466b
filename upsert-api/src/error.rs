//! `ApiError` is the single error shape the server hands back.
//!
//! Over HTTP it is a JSON body with a status derived from its code; inside
//! GraphQL responses the same code travels in `extensions.code`, with the
//! offending column or SQLSTATE under `extensions.details`.

use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use upsert_core::{StorageError, UpsertError, ValidationError};

/// Machine-readable category of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400
    InvalidInput,
    /// `where` keys select zero or several unique constraints.
    AmbiguousKey,
    UnknownColumn,
    /// Input writes a generated or `GENERATED ALWAYS` identity column.
    ReadOnlyColumn,
    /// A NOT NULL column without a default received no value.
    MissingField,
    /// A value does not coerce to its column's type.
    InvalidFormat,

    // 409, any SQLSTATE of class 23
    ConstraintViolation,

    // 500 / 503
    InternalError,
    DatabaseError,
    ServiceUnavailable,
    ConnectionPoolExhausted,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput
            | ErrorCode::AmbiguousKey
            | ErrorCode::UnknownColumn
            | ErrorCode::ReadOnlyColumn
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::ConstraintViolation => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Fallback message when no specific one is available.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Request argument is not usable",
            ErrorCode::AmbiguousKey => "Where keys must match exactly one unique constraint",
            ErrorCode::UnknownColumn => "Unknown column",
            ErrorCode::ReadOnlyColumn => "Column is read-only",
            ErrorCode::MissingField => "Required column has no value",
            ErrorCode::InvalidFormat => "Value does not match the column type",
            ErrorCode::ConstraintViolation => "Write violates a database constraint",
            ErrorCode::InternalError => "Unexpected server failure",
            ErrorCode::DatabaseError => "PostgreSQL rejected the statement",
            ErrorCode::ServiceUnavailable => "PostgreSQL is unreachable",
            ErrorCode::ConnectionPoolExhausted => "No pooled connection became free in time",
        }
    }

    /// Wire form used in JSON bodies and GraphQL extensions.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::AmbiguousKey => "AMBIGUOUS_KEY",
            ErrorCode::UnknownColumn => "UNKNOWN_COLUMN",
            ErrorCode::ReadOnlyColumn => "READ_ONLY_COLUMN",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::ConnectionPoolExhausted => "CONNECTION_POOL_EXHAUSTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Offending column, key set or SQLSTATE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.message.clone()).extend_with(|_, e| {
            e.set("code", self.code.as_str());
            if let Some(details) = &self.details {
                if let Ok(value) = async_graphql::Value::from_json(details.clone()) {
                    e.set("details", value);
                }
            }
        })
    }
}

impl From<UpsertError> for ApiError {
    fn from(err: UpsertError) -> Self {
        let message = err.to_string();
        match err {
            UpsertError::Validation(validation) => from_validation(validation, message),
            UpsertError::Storage(storage) => from_storage(storage, message),
            UpsertError::Schema(_) | UpsertError::Statement(_) => {
                tracing::error!(error = %message, "Internal upsert error");
                ApiError::internal_error(message)
            }
        }
    }
}

fn from_validation(err: ValidationError, message: String) -> ApiError {
    match err {
        ValidationError::AmbiguousKey { keys, matches, .. } => {
            ApiError::new(ErrorCode::AmbiguousKey, message)
                .with_details(serde_json::json!({ "keys": keys, "matches": matches }))
        }
        ValidationError::UnknownColumn { column, .. } => {
            ApiError::new(ErrorCode::UnknownColumn, message)
                .with_details(serde_json::json!({ "column": column }))
        }
        ValidationError::NullKeyValue { column, .. } => {
            ApiError::new(ErrorCode::InvalidInput, message)
                .with_details(serde_json::json!({ "column": column }))
        }
        ValidationError::ReadOnlyColumn { column, .. } => {
            ApiError::new(ErrorCode::ReadOnlyColumn, message)
                .with_details(serde_json::json!({ "column": column }))
        }
        ValidationError::MissingRequiredColumn { column, .. } => {
            ApiError::new(ErrorCode::MissingField, message)
                .with_details(serde_json::json!({ "column": column }))
        }
        ValidationError::OutOfRange { column, sql_type, .. } => {
            ApiError::new(ErrorCode::InvalidFormat, message)
                .with_details(serde_json::json!({ "column": column, "expected": sql_type }))
        }
        ValidationError::TypeMismatch { column, expected, .. } => {
            ApiError::new(ErrorCode::InvalidFormat, message)
                .with_details(serde_json::json!({ "column": column, "expected": expected }))
        }
    }
}

fn from_storage(err: StorageError, message: String) -> ApiError {
    match err {
        StorageError::Database { code, .. } => {
            let class = code.as_deref().map(|c| c.starts_with("23")).unwrap_or(false);
            let error_code = if class {
                ErrorCode::ConstraintViolation
            } else {
                ErrorCode::DatabaseError
            };
            let error = ApiError::new(error_code, message);
            match code {
                Some(sqlstate) => error.with_details(serde_json::json!({ "sqlstate": sqlstate })),
                None => error,
            }
        }
        StorageError::Unavailable { .. } => ApiError::service_unavailable(message),
        StorageError::NoRowReturned { .. }
        | StorageError::Decode { .. }
        | StorageError::LockPoisoned => {
            tracing::error!(error = %message, "Storage failure");
            ApiError::internal_error(message)
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!(error = %err, "PostgreSQL call failed");
        let error = ApiError::database_error(err.to_string());
        match err.code() {
            Some(state) => error.with_details(serde_json::json!({ "sqlstate": state.code() })),
            None => error,
        }
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        use deadpool_postgres::PoolError;

        tracing::error!(error = %err, "Could not check out a connection");
        match err {
            PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            PoolError::Closed => ApiError::service_unavailable("Connection pool was closed"),
            PoolError::Backend(e) => ApiError::from(e),
            other => ApiError::database_error(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Malformed JSON: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::AmbiguousKey.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::ConstraintViolation.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::ConnectionPoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ambiguous_key_carries_details() {
        let err = ApiError::from(UpsertError::from(ValidationError::AmbiguousKey {
            table: "public.bikes".to_string(),
            keys: vec!["make".to_string()],
            matches: 0,
        }));
        assert_eq!(err.code, ErrorCode::AmbiguousKey);
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "keys": ["make"], "matches": 0 }))
        );
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err = ApiError::from(UpsertError::from(StorageError::Database {
            code: Some("23505".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        }));
        assert_eq!(err.code, ErrorCode::ConstraintViolation);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = ApiError::from(UpsertError::from(StorageError::Database {
            code: Some("42P01".to_string()),
            message: "relation does not exist".to_string(),
        }));
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn test_graphql_extension_code() {
        let err = ApiError::new(ErrorCode::MissingField, "Required column make has no value")
            .extend();
        let code = err
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code").cloned());
        assert_eq!(
            code,
            Some(async_graphql::Value::String("MISSING_FIELD".to_string()))
        );
    }

    #[test]
    fn test_every_storage_error_has_a_code() {
        let cases = [
            (
                StorageError::Unavailable { reason: "connection refused".to_string() },
                ErrorCode::ServiceUnavailable,
            ),
            (
                StorageError::NoRowReturned { table: "public.bikes".to_string() },
                ErrorCode::InternalError,
            ),
            (
                StorageError::Decode { column: "$3".to_string(), reason: "bad".to_string() },
                ErrorCode::InternalError,
            ),
            (StorageError::LockPoisoned, ErrorCode::InternalError),
        ];
        for (storage, code) in cases {
            assert_eq!(ApiError::from(UpsertError::from(storage)).code, code);
        }
    }

    #[test]
    fn test_out_of_range_maps_to_invalid_format() {
        let err = ApiError::from(UpsertError::from(ValidationError::OutOfRange {
            column: "stock".to_string(),
            sql_type: "integer".to_string(),
            value: 2_147_483_648,
        }));
        assert_eq!(err.code, ErrorCode::InvalidFormat);
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "column": "stock", "expected": "integer" }))
        );
    }

    #[test]
    fn test_unavailable_body_shape() -> Result<(), serde_json::Error> {
        let body = serde_json::to_value(ApiError::service_unavailable("Connection pool was closed"))?;
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
        assert_eq!(body["message"], "Connection pool was closed");
        assert!(body.get("details").is_none());
        Ok(())
    }

    #[test]
    fn test_display_uses_wire_code() {
        let err = ApiError::from_code(ErrorCode::ConnectionPoolExhausted);
        assert_eq!(
            err.to_string(),
            "CONNECTION_POOL_EXHAUSTED: No pooled connection became free in time"
        );
    }
}
