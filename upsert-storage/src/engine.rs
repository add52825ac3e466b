//! Upsert execution engine: resolve, build, bind, execute.

use std::sync::Arc;

use tracing::instrument;
use upsert_core::{
    resolve_constraint, EngineResult, OrderBy, Row, TableDescriptor, UpsertRequest, UpsertResult,
};

use crate::cache::{CacheStats, TemplateCache};
use crate::row_store::RowStore;

pub struct UpsertEngine {
    store: Arc<dyn RowStore>,
    cache: TemplateCache,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            cache: TemplateCache::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Insert or update one row of `table`.
    ///
    /// Every validation error is raised before the store is called.
    #[instrument(skip_all, fields(table = %table.qualified_name()))]
    pub async fn upsert(
        &self,
        table: &TableDescriptor,
        request: &UpsertRequest,
    ) -> EngineResult<UpsertResult> {
        let constraint = resolve_constraint(table, &request.where_keys())?;
        let template = self.cache.get_or_build(table, constraint)?;
        let bound = template.bind(table, request)?;

        tracing::debug!(
            constraint = %constraint.name,
            supplied = bound.columns.iter().filter(|c| c.supplied && !c.key).count(),
            "Executing upsert"
        );
        let row = self.store.upsert(table, &bound).await?;

        Ok(UpsertResult {
            row,
            client_mutation_id: request.client_mutation_id.clone(),
        })
    }

    #[instrument(skip_all, fields(table = %table.qualified_name()))]
    pub async fn list(&self, table: &TableDescriptor, order: &[OrderBy]) -> EngineResult<Vec<Row>> {
        for term in order {
            if !table.has_column(&term.column) {
                return Err(upsert_core::ValidationError::UnknownColumn {
                    table: table.qualified_name(),
                    column: term.column.clone(),
                }
                .into());
            }
        }
        self.store.list(table, order).await
    }
}

impl std::fmt::Debug for UpsertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertEngine")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
