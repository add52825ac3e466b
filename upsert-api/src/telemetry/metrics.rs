//! Prometheus collectors for upserts, PostgreSQL round trips and HTTP
//! traffic, all registered on the default registry and served at `/metrics`.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Statement round trips; single-row upserts rarely leave the low buckets.
const STATEMENT_LATENCY_BUCKETS: &[f64] =
    &[0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0];

/// Global metrics instance, initialized on first use.
pub static METRICS: Lazy<ApiResult<UpsertMetrics>> = Lazy::new(UpsertMetrics::new);

fn register_failed(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

#[derive(Clone)]
pub struct UpsertMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: operation, table, status
    pub db_operations_total: CounterVec,

    /// labels: operation, table
    pub db_operation_duration_seconds: HistogramVec,

    /// labels: table, outcome (`ok` or an error code)
    pub upserts_total: CounterVec,

    /// labels: table
    pub upsert_duration_seconds: HistogramVec,

    /// Tables exposed by the current schema
    pub schema_tables: Gauge,
}

impl UpsertMetrics {
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "upsert_http_requests_total",
                "HTTP requests served, by route and status",
                &["method", "path", "status"]
            )
            .map_err(|e| register_failed("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "upsert_http_request_duration_seconds",
                "Time spent serving HTTP requests",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_failed("http_request_duration_seconds", e))?,

            db_operations_total: register_counter_vec!(
                "upsert_db_operations_total",
                "PostgreSQL statements executed, by kind and table",
                &["operation", "table", "status"]
            )
            .map_err(|e| register_failed("db_operations_total", e))?,

            db_operation_duration_seconds: register_histogram_vec!(
                "upsert_db_operation_duration_seconds",
                "PostgreSQL statement round-trip time",
                &["operation", "table"],
                STATEMENT_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_failed("db_operation_duration_seconds", e))?,

            upserts_total: register_counter_vec!(
                "upsert_mutations_total",
                "Total upsert mutations by table and outcome",
                &["table", "outcome"]
            )
            .map_err(|e| register_failed("upserts_total", e))?,

            upsert_duration_seconds: register_histogram_vec!(
                "upsert_mutation_duration_seconds",
                "End-to-end upsert resolver time",
                &["table"],
                STATEMENT_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_failed("upsert_duration_seconds", e))?,

            schema_tables: register_gauge!(
                "upsert_schema_tables",
                "Number of tables exposed through the GraphQL schema"
            )
            .map_err(|e| register_failed("schema_tables", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_db_operation(&self, operation: &str, table: &str, success: bool, duration_secs: f64) {
        let status = if success { "ok" } else { "error" };
        self.db_operations_total
            .with_label_values(&[operation, table, status])
            .inc();
        self.db_operation_duration_seconds
            .with_label_values(&[operation, table])
            .observe(duration_secs);
    }

    /// Record one upsert mutation. `outcome` is `ok` or the error code.
    pub fn record_upsert(&self, table: &str, outcome: &str, duration_secs: f64) {
        self.upserts_total.with_label_values(&[table, outcome]).inc();
        self.upsert_duration_seconds
            .with_label_values(&[table])
            .observe(duration_secs);
    }

    pub fn set_schema_tables(&self, count: usize) {
        self.schema_tables.set(count as f64);
    }
}

/// Handler for GET /metrics. Returns the Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.upserts_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_upsert() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_upsert("public.bikes", "ok", 0.004);
        metrics.record_upsert("public.bikes", "AMBIGUOUS_KEY", 0.0001);
        assert!(
            metrics
                .upserts_total
                .with_label_values(&["public.bikes", "ok"])
                .get()
                >= 1.0
        );
        Ok(())
    }

    #[test]
    fn test_record_db_operation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_db_operation("upsert", "public.bikes", true, 0.005);
        metrics.record_db_operation("list", "public.parts", false, 0.010);
        let failed = metrics
            .db_operations_total
            .with_label_values(&["list", "public.parts", "error"])
            .get();
        assert!(failed >= 1.0);
        Ok(())
    }
}
