//! Shared state read by the dispatcher on every request.

use crate::middleware::MiddlewareFn;
use crate::table::RouteTable;
use std::sync::{Arc, RwLock};

/// Handed to the axum router; the facade keeps a clone so customization
/// calls mutate the same table the dispatcher reads. Locks are held only
/// for synchronous bookkeeping, never across an await.
#[derive(Clone, Default)]
pub struct ScaffoldState {
    pub table: Arc<RwLock<RouteTable>>,
    pub globals: Arc<RwLock<Vec<MiddlewareFn>>>,
}

impl ScaffoldState {
    pub fn new() -> Self {
        Self::default()
    }
}
