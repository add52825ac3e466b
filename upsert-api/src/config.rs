//! API Configuration Module
//!
//! Server settings loaded from environment variables with defaults suitable
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{ApiError, ApiResult};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// Port to bind.
    pub port: u16,

    /// PostgreSQL schemas to introspect.
    pub schemas: Vec<String>,

    /// Serve the GraphiQL page at `/graphiql`.
    pub graphiql: bool,

    /// Write the generated SDL here after the schema is built.
    pub export_schema_path: Option<PathBuf>,

    /// Allowed CORS origins. Empty means allow all.
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 5000,
            schemas: vec!["public".to_string()],
            graphiql: true,
            export_schema_path: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `UPSERT_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `UPSERT_API_PORT`: Port (default: 5000)
    /// - `UPSERT_SCHEMAS`: Comma-separated schemas to expose (default: public)
    /// - `UPSERT_GRAPHIQL`: "true" or "false" (default: true)
    /// - `UPSERT_EXPORT_SCHEMA_PATH`: SDL output file (default: unset)
    /// - `UPSERT_CORS_ORIGINS`: Comma-separated allowed origins (default: all)
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();

        let bind_host = std::env::var("UPSERT_API_BIND").unwrap_or(defaults.bind_host);

        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("UPSERT_API_PORT").ok())
        {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        let schemas = std::env::var("UPSERT_SCHEMAS")
            .ok()
            .map(|s| split_list(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.schemas);

        let graphiql = std::env::var("UPSERT_GRAPHIQL")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.graphiql);

        let export_schema_path = std::env::var("UPSERT_EXPORT_SCHEMA_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let cors_origins = std::env::var("UPSERT_CORS_ORIGINS")
            .ok()
            .map(|s| split_list(&s))
            .unwrap_or_default();

        Ok(Self {
            bind_host,
            port,
            schemas,
            graphiql,
            export_schema_path,
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.schemas, vec!["public".to_string()]);
        assert!(config.graphiql);
        assert!(config.export_schema_path.is_none());
    }

    #[test]
    fn test_bind_addr() -> ApiResult<()> {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..ApiConfig::default()
        };
        assert_eq!(config.bind_addr()?.to_string(), "127.0.0.1:8080");

        let bad = ApiConfig {
            bind_host: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("public, app_public ,,"),
            vec!["public".to_string(), "app_public".to_string()]
        );
    }
}
