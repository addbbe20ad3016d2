//! The scaffold facade: entity registration, customization, middleware
//! registration, and serving.

use crate::datastore::{factory_for, DataSource};
use crate::descriptor::{CrudDescriptor, CrudDescriptorStore, CrudOverrides};
use crate::entity::{EntityKey, OperationKind};
use crate::error::{AppError, ScaffoldError};
use crate::middleware::{middleware_fn, MiddlewareRegistry};
use crate::pipeline::HandlerChain;
use crate::reply::Reply;
use crate::request::RequestContext;
use crate::routes::scaffold_router;
use crate::state::ScaffoldState;
use crate::table::BoundRoute;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Orchestrates the descriptor store, middleware registry, and route table
/// over one datastore.
///
/// `make_crud` binds an entity's five default routes;
/// `customize_*_crud` overlays partial overrides onto the stored descriptor
/// and atomically rebinds just that operation's route. Route topology is
/// meant to be mutated during setup, before [`Scaffold::serve`]; a rebind
/// under live traffic takes effect for requests matched after it, while
/// requests already dispatched finish under the old chain.
pub struct Scaffold {
    data: Arc<dyn DataSource>,
    registry: MiddlewareRegistry,
    descriptors: CrudDescriptorStore,
    state: ScaffoldState,
}

impl Scaffold {
    pub fn new(data: Arc<dyn DataSource>) -> Self {
        Self {
            data,
            registry: MiddlewareRegistry::new(),
            descriptors: CrudDescriptorStore::new(),
            state: ScaffoldState::new(),
        }
    }

    /// Register the five default CRUD routes for an entity:
    /// index/store at the collection path, show/update/delete at the item
    /// path. Registering the same entity twice replaces its earlier
    /// bindings.
    pub fn make_crud(&mut self, entity: &EntityKey) -> Result<(), ScaffoldError> {
        let descriptors = self.descriptors.create_default(entity);
        for descriptor in descriptors {
            self.bind(descriptor)?;
        }
        tracing::info!(entity = %entity, "registered CRUD routes");
        Ok(())
    }

    pub fn customize_index_crud(
        &mut self,
        entity: &EntityKey,
        overrides: CrudOverrides,
    ) -> Result<(), ScaffoldError> {
        self.customize(entity, OperationKind::Index, overrides)
    }

    pub fn customize_show_crud(
        &mut self,
        entity: &EntityKey,
        overrides: CrudOverrides,
    ) -> Result<(), ScaffoldError> {
        self.customize(entity, OperationKind::Show, overrides)
    }

    pub fn customize_store_crud(
        &mut self,
        entity: &EntityKey,
        overrides: CrudOverrides,
    ) -> Result<(), ScaffoldError> {
        self.customize(entity, OperationKind::Store, overrides)
    }

    pub fn customize_update_crud(
        &mut self,
        entity: &EntityKey,
        overrides: CrudOverrides,
    ) -> Result<(), ScaffoldError> {
        self.customize(entity, OperationKind::Update, overrides)
    }

    pub fn customize_delete_crud(
        &mut self,
        entity: &EntityKey,
        overrides: CrudOverrides,
    ) -> Result<(), ScaffoldError> {
        self.customize(entity, OperationKind::Delete, overrides)
    }

    /// Merge, resolve, rebind, commit, in that order, so a failed
    /// middleware resolution leaves both the stored descriptor and the live
    /// binding exactly as they were.
    fn customize(
        &mut self,
        entity: &EntityKey,
        operation: OperationKind,
        overrides: CrudOverrides,
    ) -> Result<(), ScaffoldError> {
        let merged = self.descriptors.merged(entity, operation, overrides)?;
        self.bind(merged.clone())?;
        self.descriptors.put(merged);
        tracing::info!(entity = %entity, operation = %operation, "customized CRUD route");
        Ok(())
    }

    fn bind(&mut self, descriptor: CrudDescriptor) -> Result<(), ScaffoldError> {
        let middlewares = self.registry.resolve(&descriptor.middleware_names)?;
        let chain = Arc::new(HandlerChain {
            factory: factory_for(&self.data, &descriptor.entity),
            middlewares,
            descriptor: descriptor.clone(),
        });
        let route = BoundRoute {
            entity: descriptor.entity,
            operation: descriptor.operation,
            path: descriptor.path,
            chain,
        };
        let mut table = self.state.table.write().expect("route table poisoned");
        table.bind(route)
    }

    /// Store a named middleware for later resolution from descriptor name
    /// lists. With `name = None` the name is derived from the handler's
    /// type path. Returns the name used; re-registering a name replaces the
    /// previous handler.
    pub fn register_middleware<F, Fut>(&mut self, name: Option<&str>, handler: F) -> String
    where
        F: Fn(RequestContext, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.registry.register(name, handler)
    }

    /// Append a middleware that runs for every scaffolded request, before
    /// any per-route middleware.
    pub fn register_global_middleware<F, Fut>(&mut self, handler: F)
    where
        F: Fn(RequestContext, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.state
            .globals
            .write()
            .expect("global middleware poisoned")
            .push(middleware_fn(handler));
    }

    /// Shared state, for keeping a handle able to rebind after the router
    /// has been taken.
    pub fn state(&self) -> ScaffoldState {
        self.state.clone()
    }

    /// Stored descriptor snapshot, if the entity is registered.
    pub fn descriptor(&self, entity: &EntityKey, operation: OperationKind) -> Option<CrudDescriptor> {
        self.descriptors.get(entity, operation).cloned()
    }

    /// The axum router serving the scaffolded routes plus /health and
    /// /version.
    pub fn router(&self) -> axum::Router {
        scaffold_router(self.state.clone())
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "scaffold listening");
        }
        axum::serve(listener, self.router()).await
    }
}
