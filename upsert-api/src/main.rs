//! pg-upsert server entry point.
//!
//! Loads configuration, introspects the database, builds the GraphQL schema
//! and serves it until Ctrl-C.

use std::sync::Arc;

use upsert_api::telemetry::{init_tracing, TelemetryConfig};
use upsert_api::{
    create_router, export_sdl, schema_from_tables, ApiConfig, ApiError, ApiResult, AppState,
    DbClient, DbConfig,
};
use upsert_storage::UpsertEngine;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;

    let raw_tables = db.introspect(&api_config.schemas).await?;
    tracing::info!(
        tables = raw_tables.len(),
        schemas = ?api_config.schemas,
        "Introspection complete"
    );

    let engine = Arc::new(UpsertEngine::new(Arc::new(db)));
    let (schema, _fields) = schema_from_tables(raw_tables, engine.clone())?;

    if let Some(path) = &api_config.export_schema_path {
        export_sdl(&schema, path)?;
    }

    let addr = api_config.bind_addr()?;
    let app = create_router(AppState::new(schema, engine, api_config));

    tracing::info!(%addr, "Starting pg-upsert server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
