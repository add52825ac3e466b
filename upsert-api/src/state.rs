//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use upsert_storage::UpsertEngine;

use crate::config::ApiConfig;
use crate::graphql::Schema;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub schema: Schema,
    /// The engine the schema resolvers execute against; health checks ping
    /// its store.
    pub engine: Arc<UpsertEngine>,
    pub config: ApiConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(schema: Schema, engine: Arc<UpsertEngine>, config: ApiConfig) -> Self {
        Self {
            schema,
            engine,
            config,
            start_time: Instant::now(),
        }
    }
}

macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<AppState> for $type {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Schema, schema);
impl_from_ref!(Arc<UpsertEngine>, engine);
