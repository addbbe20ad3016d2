//! Per-operation descriptors and the store that owns them.
//!
//! A descriptor is the stored configuration for one entity's one operation:
//! route template, the three phase functions, and the middleware name list.
//! The HTTP method is derived from the operation and the path is fixed at
//! creation; customization only ever changes behavior, never route shape.

use crate::datastore::QueryBuilderFactory;
use crate::defaults;
use crate::entity::{EntityKey, OperationKind};
use crate::error::{AppError, ScaffoldError};
use crate::reply::Reply;
use crate::request::RequestContext;
use axum::http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type PhaseFuture<T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send>>;

/// `before`: derive side data from the request (auth checks, parsed
/// filters). The returned value is handed to `during` untouched.
pub type BeforeFn = Arc<dyn Fn(RequestContext) -> PhaseFuture<Value> + Send + Sync>;

/// `during`: the operation itself. Receives the entity-scoped query-builder
/// factory and the before data; returns one entity, or an array for index.
pub type DuringFn =
    Arc<dyn Fn(RequestContext, QueryBuilderFactory, Value, Reply) -> PhaseFuture<Value> + Send + Sync>;

/// `after`: finalize the response from the operation result.
pub type AfterFn = Arc<dyn Fn(RequestContext, Value, Reply) -> PhaseFuture<()> + Send + Sync>;

pub fn before_fn<F, Fut>(f: F) -> BeforeFn
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

pub fn during_fn<F, Fut>(f: F) -> DuringFn
where
    F: Fn(RequestContext, QueryBuilderFactory, Value, Reply) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    Arc::new(move |req, factory, before, reply| Box::pin(f(req, factory, before, reply)))
}

pub fn after_fn<F, Fut>(f: F) -> AfterFn
where
    F: Fn(RequestContext, Value, Reply) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    Arc::new(move |req, result, reply| Box::pin(f(req, result, reply)))
}

/// Stored configuration for one (entity, operation) pair. All three phases
/// are always populated; defaults fill any gap.
#[derive(Clone)]
pub struct CrudDescriptor {
    pub entity: EntityKey,
    pub operation: OperationKind,
    pub path: String,
    pub before: BeforeFn,
    pub during: DuringFn,
    pub after: AfterFn,
    pub middleware_names: Vec<String>,
}

impl CrudDescriptor {
    /// Defaults for one operation: default phases, no middleware, the
    /// conventional route template.
    pub fn default_for(entity: &EntityKey, operation: OperationKind) -> Self {
        Self {
            entity: entity.clone(),
            operation,
            path: operation.default_path(entity),
            before: defaults::before(),
            during: defaults::during(operation),
            after: defaults::after(operation),
            middleware_names: Vec::new(),
        }
    }

    /// Derived from the operation, never stored or mutated independently.
    pub fn method(&self) -> Method {
        self.operation.method()
    }

    /// Field-wise overlay: every field present in `overrides` replaces the
    /// existing value, every omitted field is kept. Path and method are not
    /// overridable.
    pub fn merged(&self, overrides: CrudOverrides) -> Self {
        Self {
            entity: self.entity.clone(),
            operation: self.operation,
            path: self.path.clone(),
            before: overrides.before.unwrap_or_else(|| Arc::clone(&self.before)),
            during: overrides.during.unwrap_or_else(|| Arc::clone(&self.during)),
            after: overrides.after.unwrap_or_else(|| Arc::clone(&self.after)),
            middleware_names: overrides
                .middlewares
                .unwrap_or_else(|| self.middleware_names.clone()),
        }
    }
}

/// Partial customization of one operation. Built with the chaining methods;
/// anything left unset keeps the descriptor's current value.
#[derive(Clone, Default)]
pub struct CrudOverrides {
    pub before: Option<BeforeFn>,
    pub during: Option<DuringFn>,
    pub after: Option<AfterFn>,
    pub middlewares: Option<Vec<String>>,
}

impl CrudOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        self.before = Some(before_fn(f));
        self
    }

    pub fn during<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, QueryBuilderFactory, Value, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        self.during = Some(during_fn(f));
        self
    }

    pub fn after<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, Value, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.after = Some(after_fn(f));
        self
    }

    pub fn middlewares<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middlewares = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Process-wide record of every registered entity's five descriptors.
#[derive(Default)]
pub struct CrudDescriptorStore {
    entries: HashMap<EntityKey, HashMap<OperationKind, CrudDescriptor>>,
}

impl CrudDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store the five default descriptors for an entity.
    /// Registering the same entity again rebuilds its defaults; the caller's
    /// rebinding then replaces the earlier routes.
    pub fn create_default(&mut self, entity: &EntityKey) -> Vec<CrudDescriptor> {
        if self.entries.contains_key(entity) {
            tracing::warn!(entity = %entity, "entity already registered, replacing its descriptors");
        }
        let set: HashMap<OperationKind, CrudDescriptor> = OperationKind::ALL
            .into_iter()
            .map(|op| (op, CrudDescriptor::default_for(entity, op)))
            .collect();
        let out = OperationKind::ALL
            .into_iter()
            .map(|op| set[&op].clone())
            .collect();
        self.entries.insert(entity.clone(), set);
        out
    }

    pub fn get(&self, entity: &EntityKey, operation: OperationKind) -> Option<&CrudDescriptor> {
        self.entries.get(entity).and_then(|set| set.get(&operation))
    }

    /// Merge preview: the stored descriptor overlaid with `overrides`,
    /// without committing. Lets the caller resolve middleware first so a
    /// failed resolution leaves the store untouched.
    pub fn merged(
        &self,
        entity: &EntityKey,
        operation: OperationKind,
        overrides: CrudOverrides,
    ) -> Result<CrudDescriptor, ScaffoldError> {
        let existing = self
            .get(entity, operation)
            .ok_or_else(|| ScaffoldError::EntityNotRegistered(entity.name().to_string()))?;
        Ok(existing.merged(overrides))
    }

    /// Commit a previously previewed descriptor.
    pub fn put(&mut self, descriptor: CrudDescriptor) {
        self.entries
            .entry(descriptor.entity.clone())
            .or_default()
            .insert(descriptor.operation, descriptor);
    }
}
