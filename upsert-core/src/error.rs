//! Error types for upsert synthesis and execution

use thiserror::Error;

/// Errors raised while normalizing an introspected table.
///
/// These are fatal for the affected table at schema-build time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Table {table} has no usable unique constraint")]
    NoUniqueConstraint { table: String },

    #[error("Unsupported type {sql_type} for column {table}.{column}")]
    UnsupportedType {
        table: String,
        column: String,
        sql_type: String,
    },

    #[error("Duplicate column {column} on table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("Constraint {constraint} on {table} references unknown column {column}")]
    UnknownConstraintColumn {
        table: String,
        constraint: String,
        column: String,
    },

    #[error("Constraint {constraint} on {table} has no columns")]
    EmptyConstraint { table: String, constraint: String },

    #[error("Columns {first} and {second} on {table} both map to field {field}")]
    FieldNameCollision {
        table: String,
        first: String,
        second: String,
        field: String,
    },

    #[error("Tables {first} and {second} both map to type {type_name}")]
    TypeNameCollision {
        first: String,
        second: String,
        type_name: String,
    },
}

/// Request-level validation errors. None of these ever reach the database.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Where keys {keys:?} on {table} match {matches} unique constraints, expected exactly one")]
    AmbiguousKey {
        table: String,
        keys: Vec<String>,
        matches: usize,
    },

    #[error("Unknown column {column} on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Key column {column} on {table} cannot be null")]
    NullKeyValue { table: String, column: String },

    #[error("Column {column} on {table} is read-only")]
    ReadOnlyColumn { table: String, column: String },

    #[error("Required column {column} on {table} has no value")]
    MissingRequiredColumn { table: String, column: String },

    #[error("Invalid value for {column}: expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("Value {value} is out of range for {column} ({sql_type})")]
    OutOfRange {
        column: String,
        sql_type: String,
        value: i64,
    },
}

/// Inconsistencies between a table, its constraints, and a statement template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatementBuildError {
    #[error("Constraint {columns:?} is not a unique constraint of {table}")]
    UnknownConstraint { table: String, columns: Vec<String> },

    #[error("Template for {table} keyed on {expected:?} cannot bind where keys {got:?}")]
    ConstraintMismatch {
        table: String,
        expected: Vec<String>,
        got: Vec<String>,
    },
}

/// Errors surfaced by a row store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error{}: {message}", .code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("Connection unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Upsert on {table} returned no row")]
    NoRowReturned { table: String },

    #[error("Cannot decode column {column}: {reason}")]
    Decode { column: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Master error type for upsert operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpsertError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Statement error: {0}")]
    Statement(#[from] StatementBuildError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for upsert operations.
pub type EngineResult<T> = Result<T, UpsertError>;
