use std::sync::Arc;

use crate::executor::{Executor, ExecutorKind, LightweightExecutor, Task};
use crate::pool::ThreadPool;
use crate::RuntimeResult;

/// Server pool backed by lightweight tasks.
///
/// Tasks do not map to OS threads, so the thread counts are nominal: one
/// thread, one idle thread, never low on threads. The runtime handles
/// elasticity on its own.
#[derive(Debug)]
pub struct LightweightThreadPool {
    executor: Arc<LightweightExecutor>,
}

impl LightweightThreadPool {
    pub fn new(executor: Arc<LightweightExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<LightweightExecutor> {
        &self.executor
    }
}

impl ThreadPool for LightweightThreadPool {
    fn name(&self) -> &str {
        self.executor.name()
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Lightweight
    }

    fn execute(&self, task: Task) -> RuntimeResult<()> {
        self.executor.execute(task)
    }

    fn shutdown(&self) {
        self.executor.shutdown();
    }

    /// No bounded worker set to wait on.
    fn join(&self) {}

    fn threads(&self) -> usize {
        1
    }

    fn idle_threads(&self) -> usize {
        1
    }

    fn is_low_on_threads(&self) -> bool {
        false
    }
}
