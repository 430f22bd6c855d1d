//! Run blocking work from async handlers on the server thread pool.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use dog_runtime::{RuntimeError, RuntimeResult, ThreadPool};
use tokio::sync::oneshot;

/// Run `f` on `pool` and await its result.
///
/// A panic inside `f` resolves to [`RuntimeError::TaskDropped`].
pub async fn offload<F, T>(pool: &dyn ThreadPool, f: F) -> RuntimeResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    pool.execute(Box::new(move || {
        let _ = tx.send(f());
    }))?;
    rx.await.map_err(|_| RuntimeError::TaskDropped)
}

/// Extractor handing handlers the server thread pool
#[derive(Clone)]
pub struct ServerPool(pub Arc<dyn ThreadPool>);

impl ServerPool {
    pub async fn run<F, T>(&self, f: F) -> RuntimeResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        offload(self.0.as_ref(), f).await
    }
}

impl<S> FromRequestParts<S> for ServerPool
where
    S: Send + Sync,
    Arc<dyn ThreadPool>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Arc::<dyn ThreadPool>::from_ref(state)))
    }
}
