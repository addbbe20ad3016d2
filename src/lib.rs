//! CRUD scaffold: auto-generated entity routes with a customizable
//! three-phase hook pipeline.
//!
//! `make_crud` binds index/show/store/update/delete endpoints for an
//! entity; `customize_*_crud` replaces any phase (or the middleware list)
//! of any endpoint at runtime without restarting the server. Storage is
//! pluggable behind the [`DataSource`] / [`QueryBuilder`] seam.

pub mod datastore;
pub mod defaults;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod reply;
pub mod request;
pub mod routes;
pub mod server;
pub mod state;
pub mod table;

pub use datastore::{DataSource, MemoryDataSource, PgDataSource, QueryBuilder, QueryBuilderFactory};
pub use descriptor::{CrudDescriptor, CrudDescriptorStore, CrudOverrides};
pub use entity::{EntityKey, OperationKind};
pub use error::{error_body, AppError, ScaffoldError};
pub use middleware::{middleware_fn, MiddlewareFn, MiddlewareRegistry};
pub use pipeline::{HandlerChain, HookPipeline};
pub use reply::Reply;
pub use request::RequestContext;
pub use routes::{common_routes, scaffold_router};
pub use server::Scaffold;
pub use state::ScaffoldState;
pub use table::{BoundRoute, RouteTable};
