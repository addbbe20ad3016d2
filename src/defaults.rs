//! Default phase implementations for the five scaffolded operations.
//!
//! Every operation responds 200 with the operation result as the body,
//! delete included: the deleted row is echoed back, and deleting an absent
//! row yields `null` rather than an error. Show and update raise
//! [`AppError::NotFound`] for the shared error layer to translate.

use crate::descriptor::{after_fn, before_fn, during_fn, AfterFn, BeforeFn, DuringFn};
use crate::entity::OperationKind;
use crate::error::AppError;
use crate::request::RequestContext;
use serde_json::{json, Value};

/// Default `before`: an empty context object.
pub fn before() -> BeforeFn {
    before_fn(|_req| async { Ok(json!({})) })
}

fn id_param(req: &RequestContext) -> Result<String, AppError> {
    req.param("id")
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("missing id path parameter".into()))
}

fn body_object(req: &RequestContext) -> Result<Value, AppError> {
    match req.body() {
        Value::Object(_) => Ok(req.body().clone()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub fn during(operation: OperationKind) -> DuringFn {
    match operation {
        OperationKind::Index => during_fn(|req, factory, _before, _reply| async move {
            let mut qb = factory();
            for (key, value) in req.query_pairs() {
                match key {
                    "limit" => {
                        if let Ok(n) = value.parse() {
                            qb = qb.limit(n);
                        }
                    }
                    "offset" => {
                        if let Ok(n) = value.parse() {
                            qb = qb.offset(n);
                        }
                    }
                    _ => qb = qb.filter(key, Value::String(value.to_string())),
                }
            }
            let rows = qb.fetch_all().await?;
            Ok(Value::Array(rows))
        }),
        OperationKind::Show => during_fn(|req, factory, _before, _reply| async move {
            let id = id_param(&req)?;
            factory()
                .fetch_by_id(&id)
                .await?
                .ok_or(AppError::NotFound(id))
        }),
        OperationKind::Store => during_fn(|req, factory, _before, _reply| async move {
            let body = body_object(&req)?;
            factory().insert(&body).await
        }),
        OperationKind::Update => during_fn(|req, factory, _before, _reply| async move {
            let id = id_param(&req)?;
            let body = body_object(&req)?;
            factory()
                .patch(&id, &body)
                .await?
                .ok_or(AppError::NotFound(id))
        }),
        OperationKind::Delete => during_fn(|req, factory, _before, _reply| async move {
            let id = id_param(&req)?;
            let removed = factory().remove(&id).await?;
            Ok(removed.unwrap_or(Value::Null))
        }),
    }
}

/// Default `after` for every operation: 200 with the result as the body.
pub fn after(_operation: OperationKind) -> AfterFn {
    after_fn(|_req, result, reply| async move {
        reply.ok(result);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{factory_for, DataSource, MemoryDataSource};
    use crate::entity::EntityKey;
    use crate::reply::Reply;
    use axum::http::Method;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn setup() -> (crate::datastore::QueryBuilderFactory, MemoryDataSource, EntityKey) {
        let data = MemoryDataSource::new();
        let user = EntityKey::new("user");
        data.seed(
            &user,
            [
                json!({"id": 1, "name": "Jane", "role": "admin"}),
                json!({"id": 2, "name": "Bob", "role": "member"}),
            ],
        );
        let source: Arc<dyn DataSource> = Arc::new(data.clone());
        (factory_for(&source, &user), data, user)
    }

    fn get_req(path: &str, params: &[(&str, &str)], query: &[(&str, &str)]) -> RequestContext {
        RequestContext::synthetic(
            Method::GET,
            path,
            params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            Value::Null,
        )
    }

    #[tokio::test]
    async fn index_applies_query_filters() {
        let (factory, _, _) = setup();
        let req = get_req("/users", &[], &[("role", "admin")]);
        let result = during(OperationKind::Index)(req, factory, json!({}), Reply::new())
            .await
            .unwrap();
        let rows = result.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Jane");
    }

    #[tokio::test]
    async fn show_raises_not_found() {
        let (factory, _, _) = setup();
        let req = get_req("/users/9", &[("id", "9")], &[]);
        let err = during(OperationKind::Show)(req, factory, json!({}), Reply::new()).await;
        assert!(matches!(err, Err(AppError::NotFound(id)) if id == "9"));
    }

    #[tokio::test]
    async fn delete_echoes_null_for_absent_row() {
        let (factory, _, _) = setup();
        let req = get_req("/users/9", &[("id", "9")], &[]);
        let result = during(OperationKind::Delete)(req, factory, json!({}), Reply::new())
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn store_requires_an_object_body() {
        let (factory, _, _) = setup();
        let req = RequestContext::synthetic(
            Method::POST,
            "/users",
            HashMap::new(),
            HashMap::new(),
            json!([1, 2]),
        );
        let err = during(OperationKind::Store)(req, factory, json!({}), Reply::new()).await;
        assert!(matches!(err, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn after_settles_ok_with_result() {
        let reply = Reply::new();
        let req = get_req("/users", &[], &[]);
        after(OperationKind::Index)(req, json!([1]), reply.clone())
            .await
            .unwrap();
        let (status, body) = reply.take().unwrap();
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body, Some(json!([1])));
    }
}
