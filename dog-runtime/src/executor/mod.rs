pub mod lightweight;
pub mod pooled;

use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::{RuntimeError, RuntimeResult};

pub use lightweight::LightweightExecutor;
pub use pooled::PooledExecutor;

/// A unit of work handed to an executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An async unit of work handed to an executor
pub type TaskFuture = BoxFuture<'static, ()>;

/// Which concurrency model backs an executor or pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// One cheap task per submission, multiplexed over a few OS threads
    Lightweight,
    /// Reusable named OS threads servicing a queue
    Pooled,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Lightweight => f.write_str("lightweight"),
            ExecutorKind::Pooled => f.write_str("pooled"),
        }
    }
}

/// Submit work for asynchronous execution.
///
/// Submission never blocks the caller. The only failure is submitting to an
/// executor that has been shut down (or, for pooled executors, an OS refusal
/// to start the first worker thread).
pub trait Executor: Send + Sync {
    /// Subsystem name this executor was created for
    fn name(&self) -> &str;

    fn kind(&self) -> ExecutorKind;

    fn execute(&self, task: Task) -> RuntimeResult<()>;

    fn spawn(&self, future: TaskFuture) -> RuntimeResult<()>;

    /// Stop accepting new work. Already submitted work still runs.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}

impl dyn Executor {
    /// Submit a closure without boxing it at the call site
    pub fn submit<F>(&self, f: F) -> RuntimeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Box::new(f))
    }

    /// Submit a future without boxing it at the call site
    pub fn spawn_future<F>(&self, future: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(Box::pin(future))
    }

    /// Run `f` on this executor and wait for its result.
    ///
    /// Resolves to `TaskDropped` if the closure panicked.
    pub async fn run<F, T>(&self, f: F) -> RuntimeResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.execute(Box::new(move || {
            let _ = tx.send(f());
        }))?;
        rx.await.map_err(|_| RuntimeError::TaskDropped)
    }
}
