//! Three-phase execution over a bound descriptor snapshot.

use crate::datastore::QueryBuilderFactory;
use crate::descriptor::CrudDescriptor;
use crate::error::AppError;
use crate::middleware::MiddlewareFn;
use crate::reply::Reply;
use crate::request::RequestContext;
use std::sync::Arc;

/// Everything a bound route needs at request time: the descriptor snapshot,
/// its middleware chain resolved at bind time, and the entity-scoped
/// query-builder factory. Frozen when the route is bound; descriptor store
/// mutations do not propagate here, which is why customization re-binds.
pub struct HandlerChain {
    pub descriptor: CrudDescriptor,
    pub middlewares: Vec<MiddlewareFn>,
    pub factory: QueryBuilderFactory,
}

pub struct HookPipeline;

impl HookPipeline {
    /// Run `globals`, then the route middleware, then
    /// `before` -> `during` -> `after`, each awaited in turn.
    ///
    /// A middleware that settles the reply ends the pipeline without
    /// invoking any phase. Any error aborts the remainder and propagates to
    /// the dispatcher's error boundary; the pipeline never writes a
    /// response of its own.
    pub async fn execute(
        globals: &[MiddlewareFn],
        chain: &HandlerChain,
        req: RequestContext,
        reply: Reply,
    ) -> Result<(), AppError> {
        for mw in globals.iter().chain(chain.middlewares.iter()) {
            mw(req.clone(), reply.clone()).await?;
            if reply.is_settled() {
                tracing::debug!(
                    entity = %chain.descriptor.entity,
                    operation = %chain.descriptor.operation,
                    "middleware settled the response, skipping phases"
                );
                return Ok(());
            }
        }

        let d = &chain.descriptor;
        let before_data = (d.before)(req.clone()).await?;
        let result = (d.during)(
            req.clone(),
            Arc::clone(&chain.factory),
            before_data,
            reply.clone(),
        )
        .await?;
        (d.after)(req, result, reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{factory_for, DataSource, MemoryDataSource};
    use crate::descriptor::CrudOverrides;
    use crate::entity::{EntityKey, OperationKind};
    use crate::middleware::middleware_fn;
    use axum::http::Method;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn chain_for(overrides: CrudOverrides, middlewares: Vec<MiddlewareFn>) -> HandlerChain {
        let user = EntityKey::new("user");
        let source: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new());
        let descriptor =
            crate::descriptor::CrudDescriptor::default_for(&user, OperationKind::Store).merged(overrides);
        HandlerChain {
            factory: factory_for(&source, &user),
            descriptor,
            middlewares,
        }
    }

    fn post_req(body: Value) -> RequestContext {
        RequestContext::synthetic(Method::POST, "/users", HashMap::new(), HashMap::new(), body)
    }

    #[tokio::test]
    async fn phases_run_in_order_each_awaited() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let overrides = CrudOverrides::new()
            .before({
                let log = Arc::clone(&log);
                move |_req| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().unwrap().push("before");
                        Ok(json!({}))
                    }
                }
            })
            .during({
                let log = Arc::clone(&log);
                move |_req, _factory, _before, _reply| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().unwrap().push("during");
                        Ok(Value::Null)
                    }
                }
            })
            .after({
                let log = Arc::clone(&log);
                move |_req, _result, reply: Reply| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().unwrap().push("after");
                        reply.no_content();
                        Ok(())
                    }
                }
            });

        let mw = {
            let log = Arc::clone(&log);
            middleware_fn(move |_req, _reply| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("middleware");
                    Ok(())
                }
            })
        };

        let chain = chain_for(overrides, vec![mw]);
        HookPipeline::execute(&[], &chain, post_req(Value::Null), Reply::new())
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["middleware", "before", "during", "after"]);
    }

    #[tokio::test]
    async fn settling_middleware_short_circuits() {
        let ran = Arc::new(Mutex::new(false));
        let overrides = CrudOverrides::new().before({
            let ran = Arc::clone(&ran);
            move |_req| {
                let ran = Arc::clone(&ran);
                async move {
                    *ran.lock().unwrap() = true;
                    Ok(json!({}))
                }
            }
        });
        let mw = middleware_fn(|_req, reply: Reply| async move {
            reply.forbidden(json!({"error": "nope"}));
            Ok(())
        });

        let chain = chain_for(overrides, vec![mw]);
        let reply = Reply::new();
        HookPipeline::execute(&[], &chain, post_req(Value::Null), reply.clone())
            .await
            .unwrap();
        assert!(reply.is_settled());
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn phase_error_stops_later_phases() {
        let after_ran = Arc::new(Mutex::new(false));
        let overrides = CrudOverrides::new()
            .during(|_req, _factory, _before, _reply| async {
                Err(AppError::Conflict("boom".into()))
            })
            .after({
                let after_ran = Arc::clone(&after_ran);
                move |_req, _result, _reply| {
                    let after_ran = Arc::clone(&after_ran);
                    async move {
                        *after_ran.lock().unwrap() = true;
                        Ok(())
                    }
                }
            });

        let chain = chain_for(overrides, Vec::new());
        let err = HookPipeline::execute(&[], &chain, post_req(Value::Null), Reply::new()).await;
        assert!(matches!(err, Err(AppError::Conflict(_))));
        assert!(!*after_ran.lock().unwrap());
    }

    #[tokio::test]
    async fn globals_run_before_route_middleware() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let global = {
            let log = Arc::clone(&log);
            middleware_fn(move |_req, _reply| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("global");
                    Ok(())
                }
            })
        };
        let route = {
            let log = Arc::clone(&log);
            middleware_fn(move |_req, reply: Reply| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("route");
                    reply.no_content();
                    Ok(())
                }
            })
        };
        let chain = chain_for(CrudOverrides::new(), vec![route]);
        HookPipeline::execute(&[global], &chain, post_req(Value::Null), Reply::new())
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["global", "route"]);
    }
}
