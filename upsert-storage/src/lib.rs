//! Upsert Storage - Row Stores and Execution Engine
//!
//! Defines the async row store abstraction, the statement template cache and
//! the engine that drives a request from key resolution to execution. The
//! Postgres store lives in upsert-api.

pub mod cache;
pub mod engine;
pub mod memory;
pub mod row_store;

pub use cache::{CacheStats, TemplateCache, TemplateKey};
pub use engine::UpsertEngine;
pub use memory::MemoryStore;
pub use row_store::RowStore;
