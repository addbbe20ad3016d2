//! Example consumer: registers two entities, customizes a couple of phases,
//! and serves on an in-memory datastore.
//!
//! Run from repo root: `cargo run -p example-consumer`

use crud_scaffold::{
    CrudOverrides, EntityKey, MemoryDataSource, Reply, RequestContext, Scaffold,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crud_scaffold=info")),
        )
        .init();

    let data = MemoryDataSource::new();
    let user = EntityKey::new("user");
    let resource = EntityKey::new("resource");
    data.seed(
        &user,
        [
            json!({"id": 1, "name": "Jane", "role": "admin"}),
            json!({"id": 2, "name": "Bob", "role": "member"}),
        ],
    );
    data.seed(&resource, [json!({"id": 1, "kind": "disk"})]);

    let mut scaffold = Scaffold::new(Arc::new(data));
    scaffold.make_crud(&user)?;
    scaffold.make_crud(&resource)?;

    // Everyone who reaches the pipeline counts as the ops user in this demo;
    // swap for a real auth middleware in an application.
    scaffold.register_global_middleware(|req: RequestContext, _reply| async move {
        req.set_user(json!({"name": "ops", "admin": true}));
        Ok(())
    });

    scaffold.register_middleware(Some("admin"), |req: RequestContext, reply: Reply| async move {
        if req.user()["admin"] != json!(true) {
            reply.forbidden(json!({"error": {"code": "forbidden", "message": "admin only"}}));
        }
        Ok(())
    });
    scaffold.customize_delete_crud(&resource, CrudOverrides::new().middlewares(["admin"]))?;

    // GET /users/{id} responds with just the name.
    scaffold.customize_show_crud(
        &user,
        CrudOverrides::new().after(|_req, result, reply: Reply| async move {
            reply.ok(result["name"].clone());
            Ok(())
        }),
    )?;

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3000);
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!("example consumer listening on http://127.0.0.1:{}", port);
    scaffold.serve(listener).await?;
    Ok(())
}
