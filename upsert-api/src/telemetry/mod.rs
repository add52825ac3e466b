//! Observability: tracing subscriber setup and Prometheus metrics.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, UpsertMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
