//! Liveness and readiness probes.
//!
//! `/health` pings the row store and reports template cache occupancy;
//! `/health/live` and `/health/ping` never touch the store.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use upsert_storage::UpsertEngine;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

/// Result of a single round trip to the row store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreProbe {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub status: ProbeStatus,
    pub store: StoreProbe,
    pub cached_templates: usize,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health/ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /health/live
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": ProbeStatus::Up }))
}

/// GET /health
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let store = probe_store(&state.engine).await;
    let report = Readiness {
        status: store.status,
        store,
        cached_templates: state.engine.cache_stats().entries,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };

    let code = match report.status {
        ProbeStatus::Up => StatusCode::OK,
        ProbeStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

async fn probe_store(engine: &UpsertEngine) -> StoreProbe {
    let started = Instant::now();
    match engine.store().ping().await {
        Ok(()) => StoreProbe {
            status: ProbeStatus::Up,
            round_trip_ms: Some(started.elapsed().as_millis() as u64),
            failure: None,
        },
        Err(e) => {
            let failure = ApiError::from(e).message;
            tracing::warn!(error = %failure, "Row store ping failed");
            StoreProbe {
                status: ProbeStatus::Down,
                round_trip_ms: None,
                failure: Some(failure),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::to_bytes;

    use crate::bootstrap::schema_from_tables;
    use crate::config::ApiConfig;
    use upsert_test_utils::{bikes_raw, memory_engine};

    #[test]
    fn test_down_probe_keeps_failure() -> Result<(), serde_json::Error> {
        let probe = StoreProbe {
            status: ProbeStatus::Down,
            round_trip_ms: None,
            failure: Some("connection refused".to_string()),
        };
        let json = serde_json::to_value(&probe)?;
        assert_eq!(json["status"], "down");
        assert_eq!(json["failure"], "connection refused");
        assert!(json.get("round_trip_ms").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_readiness_over_memory_store() -> Result<(), ApiError> {
        let (_store, engine) = memory_engine();
        let engine = Arc::new(engine);
        let (schema, _fields) = schema_from_tables(vec![bikes_raw()], engine.clone())?;
        let state = AppState::new(schema, engine, ApiConfig::default());

        let response = readiness(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
        let report: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(report["status"], "up");
        assert_eq!(report["store"]["status"], "up");
        assert_eq!(report["cached_templates"], 0);
        Ok(())
    }
}
