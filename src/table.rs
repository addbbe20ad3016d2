//! Live route table: which (method, path) pairs are bound to which handler
//! chain, with replace-on-rebind semantics.
//!
//! The table owns the binding, not the descriptor: each [`BoundRoute`]
//! carries a frozen [`HandlerChain`] snapshot, so replacing a descriptor
//! requires an explicit re-bind. Binding validates the new matcher before
//! committing, so a bad template leaves the table untouched; a successful
//! bind replaces any previous entry at the same (method, path) with no
//! window where both are bookkept. Requests already dispatched to the old
//! chain finish under it.
//!
//! Route topology is meant to be mutated during setup, before serving;
//! mutating under live traffic is eventually consistent, not immediate.

use crate::entity::{EntityKey, OperationKind};
use crate::error::ScaffoldError;
use crate::pipeline::HandlerChain;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

type RouteKey = (Method, String);

#[derive(Clone)]
pub struct BoundRoute {
    pub entity: EntityKey,
    pub operation: OperationKind,
    pub path: String,
    pub chain: Arc<HandlerChain>,
}

impl BoundRoute {
    pub fn method(&self) -> Method {
        self.operation.method()
    }
}

#[derive(Default)]
pub struct RouteTable {
    bound: HashMap<RouteKey, BoundRoute>,
    matchers: HashMap<Method, matchit::Router<RouteKey>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a route, replacing any existing binding at the same
    /// (method, path). Validate-then-commit: on a template error nothing
    /// changes.
    pub fn bind(&mut self, route: BoundRoute) -> Result<(), ScaffoldError> {
        let method = route.method();
        let key: RouteKey = (method.clone(), route.path.clone());

        let mut next = self.bound.clone();
        let replaced = next.insert(key, route).is_some();
        let matcher = Self::matcher_for(&next, &method)?;

        self.bound = next;
        self.matchers.insert(method.clone(), matcher);
        if replaced {
            tracing::info!(%method, "route rebound, previous handler chain replaced");
        }
        Ok(())
    }

    fn matcher_for(
        bound: &HashMap<RouteKey, BoundRoute>,
        method: &Method,
    ) -> Result<matchit::Router<RouteKey>, ScaffoldError> {
        let mut matcher = matchit::Router::new();
        for key in bound.keys().filter(|(m, _)| m == method) {
            matcher
                .insert(&key.1, key.clone())
                .map_err(|e| ScaffoldError::InvalidRoute {
                    path: key.1.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(matcher)
    }

    /// Match a request against the current bindings. Returns the bound
    /// chain and the extracted path parameters.
    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<HandlerChain>, HashMap<String, String>)> {
        let matcher = self.matchers.get(method)?;
        let matched = matcher.at(path).ok()?;
        let route = self.bound.get(matched.value)?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some((Arc::clone(&route.chain), params))
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &BoundRoute> {
        self.bound.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{factory_for, DataSource, MemoryDataSource};
    use crate::descriptor::CrudDescriptor;

    fn route(entity: &str, op: OperationKind) -> BoundRoute {
        let key = EntityKey::new(entity);
        let source: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        let descriptor = CrudDescriptor::default_for(&key, op);
        BoundRoute {
            path: descriptor.path.clone(),
            chain: Arc::new(HandlerChain {
                factory: factory_for(&source, &key),
                descriptor,
                middlewares: Vec::new(),
            }),
            entity: key,
            operation: op,
        }
    }

    #[test]
    fn rebinding_replaces_not_accumulates() {
        let mut table = RouteTable::new();
        table.bind(route("user", OperationKind::Index)).unwrap();
        table.bind(route("user", OperationKind::Index)).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.lookup(&Method::GET, "/users").is_some());
    }

    #[test]
    fn lookup_extracts_path_params() {
        let mut table = RouteTable::new();
        table.bind(route("user", OperationKind::Show)).unwrap();
        let (_, params) = table.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(table.lookup(&Method::DELETE, "/users/42").is_none());
    }

    #[test]
    fn replacement_swaps_the_chain() {
        let mut table = RouteTable::new();
        let first = route("user", OperationKind::Show);
        let first_chain = Arc::clone(&first.chain);
        table.bind(first).unwrap();

        let second = route("user", OperationKind::Show);
        let second_chain = Arc::clone(&second.chain);
        table.bind(second).unwrap();

        let (active, _) = table.lookup(&Method::GET, "/users/1").unwrap();
        assert!(Arc::ptr_eq(&active, &second_chain));
        assert!(!Arc::ptr_eq(&active, &first_chain));
    }

    #[test]
    fn invalid_template_leaves_table_unchanged() {
        let mut table = RouteTable::new();
        table.bind(route("user", OperationKind::Show)).unwrap();

        let mut bad = route("user", OperationKind::Delete);
        bad.path = "/users/{id".to_string();
        assert!(matches!(
            table.bind(bad),
            Err(ScaffoldError::InvalidRoute { .. })
        ));
        assert_eq!(table.len(), 1);
        assert!(table.lookup(&Method::GET, "/users/1").is_some());
    }

    #[test]
    fn distinct_entities_do_not_collide() {
        let mut table = RouteTable::new();
        table.bind(route("user", OperationKind::Index)).unwrap();
        table.bind(route("resource", OperationKind::Index)).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.lookup(&Method::GET, "/users").is_some());
        assert!(table.lookup(&Method::GET, "/resources").is_some());
    }
}
