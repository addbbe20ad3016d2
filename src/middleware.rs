//! Named-middleware registry.
//!
//! Descriptors refer to middleware by name; names are resolved to handlers
//! at bind time, so a typo fails the whole bind instead of silently running
//! a shorter chain. Re-registering a name replaces the previous handler:
//! last write wins, with a warning.

use crate::error::{AppError, ScaffoldError};
use crate::reply::Reply;
use crate::request::RequestContext;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type MiddlewareFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send>>;

/// A request interceptor. Runs before any pipeline phase; settling the
/// [`Reply`] short-circuits the rest of the chain and the phases.
pub type MiddlewareFn = Arc<dyn Fn(RequestContext, Reply) -> MiddlewareFuture + Send + Sync>;

pub fn middleware_fn<F, Fut>(f: F) -> MiddlewareFn
where
    F: Fn(RequestContext, Reply) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    Arc::new(move |req, reply| Box::pin(f(req, reply)))
}

/// Last path segment of a type name; the registration name for fn-item
/// handlers registered without an explicit one.
fn derived_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

#[derive(Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, MiddlewareFn>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a handler under `name`, or under a name derived from the
    /// handler's type path when `None` (useful for fn items; closures should
    /// pass an explicit name). Returns the name used. Replaces silently on
    /// collision.
    pub fn register<F, Fut>(&mut self, name: Option<&str>, handler: F) -> String
    where
        F: Fn(RequestContext, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| derived_name::<F>());
        if self.entries.insert(name.clone(), middleware_fn(handler)).is_some() {
            tracing::warn!(name = %name, "middleware name re-registered, previous handler replaced");
        }
        name
    }

    /// Resolve names to handlers in declared order. The first missing name
    /// fails the whole call; no partial chain is returned.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<MiddlewareFn>, ScaffoldError> {
        names
            .iter()
            .map(|name| {
                self.entries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ScaffoldError::MiddlewareNotFound(name.clone()))
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn require_admin(_req: RequestContext, _reply: Reply) -> Result<(), AppError> {
        Ok(())
    }

    #[test]
    fn resolves_in_declared_order() {
        let mut reg = MiddlewareRegistry::new();
        reg.register(Some("a"), |_req, _reply| async { Ok(()) });
        reg.register(Some("b"), |_req, _reply| async { Ok(()) });
        let chain = reg.resolve(&["b".into(), "a".into()]).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn missing_name_aborts_resolution() {
        let mut reg = MiddlewareRegistry::new();
        reg.register(Some("a"), |_req, _reply| async { Ok(()) });
        let err = reg.resolve(&["a".into(), "missing".into()]);
        assert!(matches!(err, Err(ScaffoldError::MiddlewareNotFound(name)) if name == "missing"));
    }

    #[test]
    fn name_defaults_to_the_handler_identifier() {
        let mut reg = MiddlewareRegistry::new();
        let name = reg.register(None, require_admin);
        assert_eq!(name, "require_admin");
        assert!(reg.contains("require_admin"));
    }

    #[test]
    fn last_registration_wins() {
        let mut reg = MiddlewareRegistry::new();
        reg.register(Some("x"), |_req, reply: Reply| async move {
            reply.ok(serde_json::json!(1));
            Ok(())
        });
        reg.register(Some("x"), |_req, reply: Reply| async move {
            reply.ok(serde_json::json!(2));
            Ok(())
        });
        let chain = reg.resolve(&["x".into()]).unwrap();
        assert_eq!(chain.len(), 1);
    }
}
