//! Thread pools handed to the embedded HTTP server.
//!
//! The server only needs the [`ThreadPool`] contract. Which implementation it
//! gets is decided once, by [`ExecutorSelector::create_server_thread_pool`],
//! and never changes afterwards.
//!
//! [`ExecutorSelector::create_server_thread_pool`]: crate::ExecutorSelector::create_server_thread_pool

pub mod lightweight;
pub mod queued;

use crate::executor::{ExecutorKind, Task};
use crate::RuntimeResult;

pub use lightweight::LightweightThreadPool;
pub use queued::QueuedThreadPool;

/// Thread pool contract expected by the server.
///
/// `threads`, `idle_threads` and `is_low_on_threads` are what the server
/// uses to decide whether to accept more connections.
pub trait ThreadPool: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ExecutorKind;

    /// Bring the pool to its ready state. Called once by the server before use.
    fn start(&self) -> RuntimeResult<()> {
        Ok(())
    }

    fn execute(&self, task: Task) -> RuntimeResult<()>;

    /// Stop accepting work; queued work still runs.
    fn shutdown(&self);

    /// Wait for the pool to drain after [`shutdown`](Self::shutdown).
    fn join(&self);

    fn threads(&self) -> usize;

    fn idle_threads(&self) -> usize;

    fn is_low_on_threads(&self) -> bool;
}

impl dyn ThreadPool {
    pub fn submit<F>(&self, f: F) -> RuntimeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Box::new(f))
    }
}
