use std::sync::Arc;

use axum::routing::MethodRouter;
use axum::Router;
use dog_runtime::{ExecutorSelector, ThreadPool};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::uploads::UploadLimits;
use crate::DogAxumState;

/// Name of the subsystem the server thread pool is created for
pub const SERVER_POOL_NAME: &str = "server";

pub struct AxumApp {
    pub selector: Arc<ExecutorSelector>,
    pub state: DogAxumState,
    router: Router<DogAxumState>,
}

impl AxumApp {
    /// Build an app whose server thread pool comes from `selector`.
    pub fn new(selector: Arc<ExecutorSelector>) -> Self {
        let pool = selector.create_server_thread_pool(SERVER_POOL_NAME);
        Self {
            selector,
            state: DogAxumState::new(pool),
            router: Router::new(),
        }
    }

    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.state = self.state.with_upload_limits(limits);
        self
    }

    pub fn pool(&self) -> &Arc<dyn ThreadPool> {
        &self.state.pool
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter<DogAxumState>) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    pub fn use_router(mut self, path: &str, router: Router<DogAxumState>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    /// Finished router with request ids and HTTP tracing applied.
    pub fn into_router(self) -> Router<()> {
        self.router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(self.state)
    }

    /// Start the thread pool, serve until the listener closes, then drain the pool.
    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let pool = Arc::clone(&self.state.pool);
        pool.start()?;

        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %listener.local_addr()?,
            pool = pool.name(),
            kind = %pool.kind(),
            "listening"
        );
        axum::serve(listener, self.into_router()).await?;

        pool.shutdown();
        tokio::task::spawn_blocking(move || pool.join()).await?;
        Ok(())
    }
}

pub fn axum(selector: Arc<ExecutorSelector>) -> AxumApp {
    AxumApp::new(selector)
}
