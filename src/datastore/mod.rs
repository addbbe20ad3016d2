//! Data-access seam: query builders over an opaque datastore.
//!
//! The pipeline never materializes queries itself. A `during` phase receives
//! a zero-argument [`QueryBuilderFactory`] already scoped to the route's
//! entity; it can compose filters and paging onto the builder before
//! executing. Two adapters ship with the crate: [`MemoryDataSource`] for
//! tests and demos, [`PgDataSource`] backed by PostgreSQL.

mod memory;
mod postgres;

pub use memory::MemoryDataSource;
pub use postgres::PgDataSource;

use crate::entity::EntityKey;
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A composable query against one entity's collection. Builder methods
/// consume and return the boxed builder so predicates can be chained;
/// terminal methods execute.
///
/// Rows are JSON objects keyed by column name; the primary identifier
/// convention is a column named `id`.
#[async_trait]
pub trait QueryBuilder: Send + Sync {
    /// Add an exact-match predicate.
    fn filter(self: Box<Self>, column: &str, value: Value) -> Box<dyn QueryBuilder>;

    fn limit(self: Box<Self>, n: u32) -> Box<dyn QueryBuilder>;

    fn offset(self: Box<Self>, n: u32) -> Box<dyn QueryBuilder>;

    /// All rows matching the composed predicates.
    async fn fetch_all(&self) -> Result<Vec<Value>, AppError>;

    /// Row with the given primary identifier, if any.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Value>, AppError>;

    /// Persist a new row built from `body`; returns the stored row.
    async fn insert(&self, body: &Value) -> Result<Value, AppError>;

    /// Apply a partial patch to the row with the given id. Returns the
    /// updated row, or `None` when no such row exists.
    async fn patch(&self, id: &str, body: &Value) -> Result<Option<Value>, AppError>;

    /// Remove the row with the given id. Returns the removed row, or `None`
    /// when no such row exists.
    async fn remove(&self, id: &str) -> Result<Option<Value>, AppError>;
}

/// Produces entity-scoped query builders. Implemented by each storage
/// adapter; the scaffold closes a factory over (source, entity) at bind time.
pub trait DataSource: Send + Sync {
    fn builder(&self, entity: &EntityKey) -> Box<dyn QueryBuilder>;
}

/// Zero-argument factory handed to `during` phases. Each call yields a fresh
/// builder for the route's entity.
pub type QueryBuilderFactory = Arc<dyn Fn() -> Box<dyn QueryBuilder> + Send + Sync>;

pub(crate) fn factory_for(source: &Arc<dyn DataSource>, entity: &EntityKey) -> QueryBuilderFactory {
    let source = Arc::clone(source);
    let entity = entity.clone();
    Arc::new(move || source.builder(&entity))
}
