//! Buffered response handle with status-code-named completion methods.
//!
//! Every middleware and pipeline phase receives a [`Reply`] clone. Calling a
//! completion method settles the response; the first settlement wins and the
//! dispatcher renders it after the pipeline returns. Until something settles
//! the reply (or a phase errors), the request has no response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
struct Rendered {
    status: StatusCode,
    body: Option<Value>,
}

/// Cheap-to-clone handle over a single-settlement response slot.
#[derive(Clone, Debug, Default)]
pub struct Reply {
    slot: Arc<Mutex<Option<Rendered>>>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle with an explicit status and optional body. Ignored if the
    /// reply is already settled.
    pub fn send(&self, status: StatusCode, body: Option<Value>) {
        let mut slot = self.slot.lock().expect("reply slot poisoned");
        if slot.is_some() {
            tracing::debug!(%status, "reply already settled, ignoring completion");
            return;
        }
        *slot = Some(Rendered { status, body });
    }

    pub fn ok(&self, body: Value) {
        self.send(StatusCode::OK, Some(body));
    }

    pub fn created(&self, body: Value) {
        self.send(StatusCode::CREATED, Some(body));
    }

    pub fn no_content(&self) {
        self.send(StatusCode::NO_CONTENT, None);
    }

    pub fn partial_content(&self, body: Value) {
        self.send(StatusCode::PARTIAL_CONTENT, Some(body));
    }

    pub fn bad_request(&self, body: Value) {
        self.send(StatusCode::BAD_REQUEST, Some(body));
    }

    pub fn unauthorized(&self, body: Value) {
        self.send(StatusCode::UNAUTHORIZED, Some(body));
    }

    pub fn forbidden(&self, body: Value) {
        self.send(StatusCode::FORBIDDEN, Some(body));
    }

    pub fn not_found(&self, body: Value) {
        self.send(StatusCode::NOT_FOUND, Some(body));
    }

    pub fn request_timeout(&self, body: Value) {
        self.send(StatusCode::REQUEST_TIMEOUT, Some(body));
    }

    pub fn conflict(&self, body: Value) {
        self.send(StatusCode::CONFLICT, Some(body));
    }

    pub fn unprocessable_entity(&self, body: Value) {
        self.send(StatusCode::UNPROCESSABLE_ENTITY, Some(body));
    }

    pub fn too_many_requests(&self, body: Value) {
        self.send(StatusCode::TOO_MANY_REQUESTS, Some(body));
    }

    pub fn internal_server_error(&self, body: Value) {
        self.send(StatusCode::INTERNAL_SERVER_ERROR, Some(body));
    }

    pub fn not_implemented(&self, body: Value) {
        self.send(StatusCode::NOT_IMPLEMENTED, Some(body));
    }

    pub fn bad_gateway(&self, body: Value) {
        self.send(StatusCode::BAD_GATEWAY, Some(body));
    }

    pub fn service_unavailable(&self, body: Value) {
        self.send(StatusCode::SERVICE_UNAVAILABLE, Some(body));
    }

    /// True once any completion method has run.
    pub fn is_settled(&self) -> bool {
        self.slot.lock().expect("reply slot poisoned").is_some()
    }

    /// Consume the settled state, if any. Used by the dispatcher.
    pub(crate) fn take(&self) -> Option<(StatusCode, Option<Value>)> {
        self.slot
            .lock()
            .expect("reply slot poisoned")
            .take()
            .map(|r| (r.status, r.body))
    }

    pub(crate) fn into_http_response(self) -> Option<Response> {
        self.take().map(|(status, body)| match body {
            Some(v) => (status, Json(v)).into_response(),
            None => status.into_response(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_completion_wins() {
        let reply = Reply::new();
        assert!(!reply.is_settled());
        reply.ok(json!({"a": 1}));
        reply.not_found(json!({"b": 2}));
        let (status, body) = reply.take().unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Some(json!({"a": 1})));
    }

    #[test]
    fn clones_share_the_slot() {
        let reply = Reply::new();
        let other = reply.clone();
        other.no_content();
        assert!(reply.is_settled());
        let (status, body) = reply.take().unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_none());
    }
}
