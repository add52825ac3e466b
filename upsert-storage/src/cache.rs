//! Statement template cache.
//!
//! Templates depend only on the table and the chosen constraint, so each
//! pair is built once and shared across requests and threads.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use upsert_core::{StatementBuildError, StatementTemplate, TableDescriptor, UniqueConstraint};

/// Cache key: qualified table name plus the constraint's columns in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub table: String,
    pub columns: Vec<String>,
}

impl TemplateKey {
    pub fn new(table: &TableDescriptor, constraint: &UniqueConstraint) -> Self {
        Self {
            table: table.qualified_name(),
            columns: constraint.columns.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: DashMap<TemplateKey, Arc<StatementTemplate>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached template for (table, constraint), building it on
    /// first use. Concurrent first uses may both build; one result wins and
    /// both callers get the same `Arc`.
    pub fn get_or_build(
        &self,
        table: &TableDescriptor,
        constraint: &UniqueConstraint,
    ) -> Result<Arc<StatementTemplate>, StatementBuildError> {
        let key = TemplateKey::new(table, constraint);
        if let Some(template) = self.templates.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(template.value()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let built = Arc::new(StatementTemplate::build(table, constraint)?);
        tracing::debug!(
            table = %key.table,
            columns = ?key.columns,
            params = built.param_count(),
            "Built upsert statement template"
        );
        let template = self.templates.entry(key).or_insert(built);
        Ok(Arc::clone(template.value()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.templates.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
