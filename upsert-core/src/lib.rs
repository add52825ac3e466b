//! Upsert Core - Table Model and Statement Synthesis
//!
//! Pure, synchronous building blocks: normalized table descriptors, unique
//! key resolution, request validation, upsert statement templates and the
//! naming of the generated GraphQL surface. No I/O happens in this crate.

pub mod adapter;
pub mod descriptor;
pub mod error;
pub mod naming;
pub mod request;
pub mod statement;
pub mod synth;
pub mod validate;
pub mod value;

pub use adapter::{describe, map_scalar, quote_ident, IdentityKind, RawColumn, RawConstraint, RawTable};
pub use descriptor::{ColumnDescriptor, ScalarType, TableDescriptor, UniqueConstraint, WireType};
pub use error::{
    EngineResult, SchemaError, StatementBuildError, StorageError, UpsertError, ValidationError,
};
pub use request::{UpsertRequest, UpsertResult};
pub use statement::{
    build, select_all, BoundColumn, BoundParam, BoundStatement, OrderBy, ParamSlot,
    StatementTemplate,
};
pub use synth::{synthesize, synthesize_all, FieldBinding, MutationField};
pub use validate::{resolve_constraint, validate_request};
pub use value::{Row, SqlValue};
