//! Dispatcher router and common routes.
//!
//! All scaffolded traffic flows through a single fallback handler that
//! consults the live [`RouteTable`](crate::table::RouteTable) per request.
//! That indirection is what lets a customization call replace a route's
//! handler chain while the server keeps listening.

use crate::error::AppError;
use crate::pipeline::HookPipeline;
use crate::reply::Reply;
use crate::request::RequestContext;
use crate::state::ScaffoldState;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum buffered request body.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Router dispatching every request through the scaffold's route table,
/// with the common routes merged in.
pub fn scaffold_router(state: ScaffoldState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
        .merge(common_routes())
}

async fn dispatch(State(state): State<ScaffoldState>, req: Request<Body>) -> Response {
    let started = std::time::Instant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    // Snapshot the chain and globals before any await; in-flight requests
    // keep their snapshot even if the route is rebound meanwhile.
    let matched = {
        let table = state.table.read().expect("route table poisoned");
        table.lookup(&method, &path)
    };
    let (chain, params) = match matched {
        Some(hit) => hit,
        None => {
            return AppError::NotFound(format!("no route for {} {}", method, path)).into_response()
        }
    };
    let globals = {
        let globals = state.globals.read().expect("global middleware poisoned");
        globals.clone()
    };

    let bytes = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(b) => b,
        Err(e) => return AppError::BadRequest(format!("unreadable body: {e}")).into_response(),
    };
    let ctx = match RequestContext::from_parts(parts, params, &bytes) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    let reply = Reply::new();
    let outcome = HookPipeline::execute(&globals, &chain, ctx, reply.clone()).await;

    let response = match outcome {
        Ok(()) => reply.into_http_response().unwrap_or_else(|| {
            tracing::warn!(%method, %path, "pipeline finished without settling the response");
            AppError::Internal("response not completed".into()).into_response()
        }),
        // A phase may have settled the reply before a later phase failed;
        // the settled response wins, otherwise the error layer renders.
        Err(e) => reply
            .into_http_response()
            .unwrap_or_else(|| e.into_response()),
    };

    tracing::debug!(
        %method,
        %path,
        status = %response.status(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dispatched"
    );
    response
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}
