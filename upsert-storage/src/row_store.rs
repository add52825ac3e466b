//! Async row store trait.
//!
//! The engine hands a fully bound statement to a store and gets the persisted
//! row back. Stores never see a request that failed validation.

use ::async_trait::async_trait;
use upsert_core::{BoundStatement, EngineResult, OrderBy, Row, TableDescriptor};

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Execute one upsert and return the row as persisted.
    ///
    /// Must run as a single atomic statement: either the row is inserted,
    /// or the existing row is updated, never both and never neither.
    async fn upsert(&self, table: &TableDescriptor, statement: &BoundStatement) -> EngineResult<Row>;

    /// All rows of `table` in the requested order.
    async fn list(&self, table: &TableDescriptor, order: &[OrderBy]) -> EngineResult<Vec<Row>>;

    /// Liveness probe for health checks.
    async fn ping(&self) -> EngineResult<()> {
        Ok(())
    }
}
