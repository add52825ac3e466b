//! pg-upsert API - GraphQL upsert mutations over PostgreSQL
//!
//! Introspects PostgreSQL tables, derives an `upsert<Table>` mutation and an
//! `all<Tables>` query per table, and serves them over HTTP (Axum). Writes go
//! through [`upsert_storage::UpsertEngine`], which issues a single
//! `INSERT ... ON CONFLICT ... DO UPDATE` per mutation.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod graphql;
pub mod introspect;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use bootstrap::{describe_tables, export_sdl, schema_from_tables};
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use graphql::{build_schema, Schema};
pub use routes::create_router;
pub use state::AppState;
