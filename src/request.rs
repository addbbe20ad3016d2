//! Per-request context handed to middleware and pipeline phases.

use crate::error::AppError;
use axum::extract::Query;
use axum::http::{request::Parts, HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

struct Inner {
    method: Method,
    path: String,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Value,
    /// Attached by upstream middleware (auth). `Null` until then.
    user: RwLock<Value>,
}

/// Cheap-to-clone handle over one request's data. Path parameters come from
/// the route template match (`/users/{id}` on `/users/42` yields `id = 42`);
/// the body is buffered and parsed as JSON before the pipeline starts.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    pub(crate) fn from_parts(
        parts: Parts,
        params: HashMap<String, String>,
        body: &[u8],
    ) -> Result<Self, AppError> {
        let query = parse_query(&parts.uri)?;
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body)
                .map_err(|e| AppError::BadRequest(format!("request body is not valid JSON: {e}")))?
        };
        Ok(Self {
            inner: Arc::new(Inner {
                method: parts.method,
                path: parts.uri.path().to_string(),
                params,
                query,
                headers: parts.headers,
                body,
                user: RwLock::new(Value::Null),
            }),
        })
    }

    /// Build a context directly from components. Useful for exercising
    /// pipelines without an HTTP transport.
    pub fn synthetic(
        method: Method,
        path: impl Into<String>,
        params: HashMap<String, String>,
        query: HashMap<String, String>,
        body: Value,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                method,
                path: path.into(),
                params,
                query,
                headers: HeaderMap::new(),
                body,
                user: RwLock::new(Value::Null),
            }),
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Named path parameter from the route template.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    /// Single query-string value.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner.query.get(name).map(String::as_str)
    }

    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed JSON body; `Null` when the request carried none.
    pub fn body(&self) -> &Value {
        &self.inner.body
    }

    /// Current user attached by upstream middleware; `Null` if none.
    pub fn user(&self) -> Value {
        self.inner.user.read().expect("user slot poisoned").clone()
    }

    /// Deserialize the current user into a caller-chosen type.
    pub fn user_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.user()).ok()
    }

    /// Attach the current user. Visible to every later phase through any
    /// clone of this context.
    pub fn set_user(&self, user: Value) {
        *self.inner.user.write().expect("user slot poisoned") = user;
    }
}

fn parse_query(uri: &Uri) -> Result<HashMap<String, String>, AppError> {
    let Query(map): Query<HashMap<String, String>> = Query::try_from_uri(uri)
        .map_err(|e| AppError::BadRequest(format!("invalid query string: {e}")))?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts_for(uri: &str) -> Parts {
        let (parts, _) = axum::http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn parses_query_and_params() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        let ctx = RequestContext::from_parts(parts_for("/users/42?limit=10&role=admin"), params, b"").unwrap();
        assert_eq!(ctx.path(), "/users/42");
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.query("limit"), Some("10"));
        assert_eq!(ctx.query("role"), Some("admin"));
        assert_eq!(ctx.body(), &Value::Null);
    }

    #[test]
    fn rejects_malformed_body() {
        let err = RequestContext::from_parts(parts_for("/users"), HashMap::new(), b"{not json");
        assert!(matches!(err, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn user_slot_is_shared_across_clones() {
        let ctx = RequestContext::from_parts(parts_for("/users"), HashMap::new(), b"").unwrap();
        let clone = ctx.clone();
        clone.set_user(json!({"name": "Jane", "admin": true}));
        assert_eq!(ctx.user()["name"], "Jane");

        #[derive(serde::Deserialize)]
        struct U {
            admin: bool,
        }
        assert!(ctx.user_as::<U>().unwrap().admin);
    }
}
