//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the
//! [`RowStore`] implementation that executes bound upsert statements.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::{Duration, Instant};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use tracing::instrument;

use upsert_core::{
    select_all, BoundParam, BoundStatement, EngineResult, OrderBy, RawTable, Row, SqlValue,
    StorageError, TableDescriptor, WireType,
};
use upsert_storage::RowStore;

use crate::error::{ApiError, ApiResult};
use crate::introspect;
use crate::telemetry::METRICS;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait timeout for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("UPSERT_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("UPSERT_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("UPSERT_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("UPSERT_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("UPSERT_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("UPSERT_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("UPSERT_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Pooled PostgreSQL client.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })
    }

    /// Read every ordinary table of `schemas` from the catalog.
    #[instrument(skip(self))]
    pub async fn introspect(&self, schemas: &[String]) -> ApiResult<Vec<RawTable>> {
        let conn = self.pool.get().await?;
        introspect::load_tables(&conn, schemas).await
    }
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

#[async_trait]
impl RowStore for DbClient {
    #[instrument(skip_all, fields(table = %statement.table))]
    async fn upsert(&self, _table: &TableDescriptor, statement: &BoundStatement) -> EngineResult<Row> {
        let started = Instant::now();
        let result = self.execute_upsert(statement).await;
        record("upsert", &statement.table, result.is_ok(), started);
        result
    }

    #[instrument(skip_all, fields(table = %table.qualified_name()))]
    async fn list(&self, table: &TableDescriptor, order: &[OrderBy]) -> EngineResult<Vec<Row>> {
        let started = Instant::now();
        let result = self.execute_list(table, order).await;
        record("list", &table.qualified_name(), result.is_ok(), started);
        result
    }

    async fn ping(&self) -> EngineResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await.map_err(storage_error)?;
        Ok(())
    }
}

impl DbClient {
    async fn execute_upsert(&self, statement: &BoundStatement) -> EngineResult<Row> {
        let params = to_sql_params(&statement.params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let conn = self.get_conn().await?;
        let prepared = conn
            .prepare_cached(&statement.sql)
            .await
            .map_err(storage_error)?;
        let row = conn
            .query_opt(&prepared, &refs)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| StorageError::NoRowReturned {
                table: statement.table.clone(),
            })?;

        Ok(decode_row(&row)?)
    }

    async fn execute_list(&self, table: &TableDescriptor, order: &[OrderBy]) -> EngineResult<Vec<Row>> {
        let sql = select_all(table, order);
        let conn = self.get_conn().await?;
        let rows = conn.query(sql.as_str(), &[]).await.map_err(storage_error)?;
        let decoded = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decoded)
    }
}

fn record(operation: &str, table: &str, success: bool, started: Instant) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_db_operation(operation, table, success, started.elapsed().as_secs_f64());
    }
}

// ============================================================================
// PARAMETER ENCODING
// ============================================================================

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Encode bound parameters. Nulls are sent as typed `None`s so the driver's
/// type check matches the explicit cast on each placeholder.
fn to_sql_params(params: &[BoundParam]) -> Result<Vec<SqlParam>, StorageError> {
    params
        .iter()
        .enumerate()
        .map(|(i, param)| {
            let encoded: SqlParam = match (param.wire, &param.value) {
                (WireType::Bool, SqlValue::Null) => Box::new(None::<bool>),
                (WireType::Int8, SqlValue::Null) => Box::new(None::<i64>),
                (WireType::Float8, SqlValue::Null) => Box::new(None::<f64>),
                (WireType::Text, SqlValue::Null) => Box::new(None::<String>),
                (WireType::Bool, SqlValue::Bool(b)) => Box::new(Some(*b)),
                (WireType::Int8, SqlValue::Int(n)) => Box::new(Some(*n)),
                (WireType::Float8, SqlValue::Float(f)) => Box::new(Some(*f)),
                (WireType::Text, SqlValue::Text(s)) => Box::new(Some(s.clone())),
                (wire, value) => {
                    return Err(StorageError::Decode {
                        column: format!("${}", i + 1),
                        reason: format!("{:?} value bound to {} parameter", value, wire.cast()),
                    })
                }
            };
            Ok(encoded)
        })
        .collect()
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn decode_row(row: &tokio_postgres::Row) -> Result<Row, StorageError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            decode_value(row, idx, column.type_(), column.name())
                .map(|value| (column.name().to_string(), value))
        })
        .collect()
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
    name: &str,
) -> Result<SqlValue, StorageError> {
    let decode_err = |e: tokio_postgres::Error| StorageError::Decode {
        column: name.to_string(),
        reason: e.to_string(),
    };

    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map_err(decode_err)?
            .map(SqlValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map_err(decode_err)?
            .map(|n| SqlValue::Int(n.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map_err(decode_err)?
            .map(|n| SqlValue::Int(n.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .map_err(decode_err)?
            .map(SqlValue::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map_err(decode_err)?
            .map(|f| SqlValue::Float(widen_real(f)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map_err(decode_err)?
            .map(SqlValue::Float)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(decode_err)?
            .map(SqlValue::Json)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx)
            .map_err(decode_err)?
            .map(|u| SqlValue::Text(u.to_string()))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map_err(decode_err)?
            .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map_err(decode_err)?
            .map(|ts| SqlValue::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map_err(decode_err)?
            .map(|ts| SqlValue::Text(ts.to_rfc3339()))
    } else {
        // Text family plus anything projected as text.
        row.try_get::<_, Option<String>>(idx)
            .map_err(decode_err)?
            .map(SqlValue::Text)
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

/// Map a driver error, keeping the SQLSTATE for database errors.
pub(crate) fn storage_error(err: tokio_postgres::Error) -> StorageError {
    if err.is_closed() {
        return StorageError::Unavailable {
            reason: err.to_string(),
        };
    }
    match err.as_db_error() {
        Some(db) => StorageError::Database {
            code: Some(db.code().code().to_string()),
            message: db.message().to_string(),
        },
        None => StorageError::Database {
            code: err.code().map(|c| c.code().to_string()),
            message: err.to_string(),
        },
    }
}

/// `real` to f64 through its shortest decimal form, so 25.6 stays 25.6.
fn widen_real(f: f32) -> f64 {
    f.to_string().parse().unwrap_or(f as f64)
}
