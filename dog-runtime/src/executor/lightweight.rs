use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, Instrument};

use crate::capability::LightweightRuntime;
use crate::executor::{Executor, ExecutorKind, Task, TaskFuture};
use crate::{RuntimeError, RuntimeResult};

/// Executor that turns every submission into its own tokio task.
///
/// There is no upper bound on concurrently running tasks. Futures run on the
/// runtime's async workers; closures run on its blocking threads, so a closure
/// that blocks never stalls other submissions.
pub struct LightweightExecutor {
    name: String,
    runtime: Arc<LightweightRuntime>,
    shutdown: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl LightweightExecutor {
    pub fn new(name: impl Into<String>, runtime: Arc<LightweightRuntime>) -> Self {
        Self {
            name: name.into(),
            runtime,
            shutdown: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tasks submitted and not yet finished
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn runtime(&self) -> &Arc<LightweightRuntime> {
        &self.runtime
    }

    fn admit(&self) -> RuntimeResult<ActiveGuard> {
        if self.is_shutdown() {
            return Err(RuntimeError::shutdown(&self.name));
        }
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(ActiveGuard(Arc::clone(&self.active)))
    }
}

/// Decrements the active counter even if the task panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Executor for LightweightExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Lightweight
    }

    fn execute(&self, task: Task) -> RuntimeResult<()> {
        let guard = self.admit()?;
        let span = tracing::debug_span!("lightweight_task", executor = %self.name);

        self.runtime.handle().spawn_blocking(move || {
            let _guard = guard;
            span.in_scope(task);
        });
        Ok(())
    }

    fn spawn(&self, future: TaskFuture) -> RuntimeResult<()> {
        let guard = self.admit()?;
        let span = tracing::debug_span!("lightweight_task", executor = %self.name);

        self.runtime.handle().spawn(
            async move {
                let _guard = guard;
                future.await;
            }
            .instrument(span),
        );
        Ok(())
    }

    fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!(executor = %self.name, active = self.active_tasks(), "lightweight executor shut down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for LightweightExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightweightExecutor")
            .field("name", &self.name)
            .field("active", &self.active_tasks())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
