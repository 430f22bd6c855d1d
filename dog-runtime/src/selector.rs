use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::capability::{Capability, LightweightRuntime, TokioProbe};
use crate::config::RuntimeConfig;
use crate::executor::{Executor, LightweightExecutor, PooledExecutor};
use crate::pool::{LightweightThreadPool, QueuedThreadPool, ThreadPool};
use crate::scheduled::ScheduledExecutor;

/// Picks lightweight tasks or named thread pools for each subsystem.
///
/// The preference switch is read on every factory call, so flipping it
/// before the first call changes what gets built. The capability probe only
/// runs when lightweight tasks are preferred.
pub struct ExecutorSelector {
    config: RuntimeConfig,
    prefer_lightweight: AtomicBool,
    capability: Arc<Capability>,
}

impl ExecutorSelector {
    /// Selector backed by the process-wide capability.
    ///
    /// When `lightweight_worker_threads` is set, the selector gets its own
    /// capability with a runtime of that size instead, and announces the
    /// lightweight server pool on its own.
    pub fn new(config: RuntimeConfig) -> Self {
        let capability = match config.lightweight_worker_threads {
            Some(workers) => Arc::new(Capability::new(TokioProbe::default().with_worker_threads(workers))),
            None => Capability::global(),
        };
        Self::with_capability(config, capability)
    }

    pub fn with_capability(config: RuntimeConfig, capability: Arc<Capability>) -> Self {
        Self {
            prefer_lightweight: AtomicBool::new(config.prefer_lightweight),
            config,
            capability,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn capability(&self) -> &Arc<Capability> {
        &self.capability
    }

    pub fn prefer_lightweight(&self) -> bool {
        self.prefer_lightweight.load(Ordering::Acquire)
    }

    /// Expected to be set during startup, before the first factory call.
    pub fn set_prefer_lightweight(&self, prefer: bool) {
        self.prefer_lightweight.store(prefer, Ordering::Release);
    }

    /// Whether factories will currently build lightweight-backed instances
    pub fn uses_lightweight(&self) -> bool {
        self.lightweight_runtime().is_some()
    }

    fn lightweight_runtime(&self) -> Option<Arc<LightweightRuntime>> {
        if !self.prefer_lightweight() {
            return None;
        }
        self.capability.runtime()
    }

    /// General-purpose executor for the subsystem `name`.
    pub fn create_executor(&self, name: &str) -> Arc<dyn Executor> {
        match self.lightweight_runtime() {
            Some(runtime) => {
                debug!(executor = name, "creating lightweight executor");
                Arc::new(LightweightExecutor::new(name, runtime))
            }
            None => {
                debug!(executor = name, "creating pooled executor");
                Arc::new(PooledExecutor::new(name, self.config.executor_pool.clone()))
            }
        }
    }

    /// Single-threaded executor for delayed and periodic work.
    pub fn create_scheduled_executor(&self, name: &str) -> ScheduledExecutor {
        ScheduledExecutor::new(name)
    }

    /// Thread pool for the embedded HTTP server.
    pub fn create_server_thread_pool(&self, name: &str) -> Arc<dyn ThreadPool> {
        match self.lightweight_runtime() {
            Some(runtime) => {
                if self.capability.claim_announcement() {
                    info!(
                        "Lightweight tasks are supported, the server will run on them by default. \
                         Disable with `runtime.prefer_lightweight = false`."
                    );
                }
                let executor = Arc::new(LightweightExecutor::new(name, runtime));
                Arc::new(LightweightThreadPool::new(executor))
            }
            None => Arc::new(QueuedThreadPool::new(name, self.config.server_pool.clone())),
        }
    }
}

impl Default for ExecutorSelector {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for ExecutorSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSelector")
            .field("prefer_lightweight", &self.prefer_lightweight())
            .field("capability", &self.capability)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::tests::CountingProbe;
    use crate::executor::ExecutorKind;
    use std::sync::mpsc;
    use std::time::Duration;
    use tracing_test::traced_test;

    const NOTICE: &str = "Lightweight tasks are supported";

    fn selector(prefer: bool, available: bool) -> (ExecutorSelector, Arc<std::sync::atomic::AtomicUsize>) {
        let (probe, calls) = CountingProbe::new(available);
        let capability = Arc::new(Capability::new(probe));
        let config = RuntimeConfig::default().prefer_lightweight(prefer);
        (ExecutorSelector::with_capability(config, capability), calls)
    }

    #[test]
    fn preferred_and_available_builds_lightweight() {
        let (selector, _) = selector(true, true);
        assert_eq!(selector.create_executor("svc").kind(), ExecutorKind::Lightweight);
        assert_eq!(selector.create_server_thread_pool("server").kind(), ExecutorKind::Lightweight);
    }

    #[test]
    fn unavailable_falls_back_to_pools() {
        let (selector, _) = selector(true, false);
        assert_eq!(selector.create_executor("svc").kind(), ExecutorKind::Pooled);
        assert_eq!(selector.create_server_thread_pool("server").kind(), ExecutorKind::Pooled);
    }

    #[test]
    fn disabled_preference_never_builds_lightweight_nor_probes() {
        let (selector, calls) = selector(false, true);
        assert_eq!(selector.create_executor("svc").kind(), ExecutorKind::Pooled);
        assert_eq!(selector.create_server_thread_pool("server").kind(), ExecutorKind::Pooled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn switch_flipped_before_first_use_takes_effect() {
        let (selector, _) = selector(true, true);
        selector.set_prefer_lightweight(false);
        assert!(!selector.uses_lightweight());
        assert_eq!(selector.create_executor("svc").kind(), ExecutorKind::Pooled);
    }

    #[test]
    fn fallback_executor_names_threads_after_subsystem() {
        let (selector, _) = selector(true, false);
        let executor = selector.create_executor("svc");
        let (tx, rx) = mpsc::channel();

        for _ in 0..3 {
            let tx = tx.clone();
            executor
                .submit(move || tx.send(std::thread::current().name().unwrap().to_string()).unwrap())
                .unwrap();
        }

        for _ in 0..3 {
            let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(name.starts_with("svc-"), "unexpected thread name {name}");
        }
    }

    #[test]
    fn probe_runs_once_across_factories() {
        let (selector, calls) = selector(true, true);
        selector.create_executor("a");
        selector.create_server_thread_pool("b");
        selector.create_executor("c");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scheduled_executor_is_single_named_thread() {
        let (selector, _) = selector(true, true);
        let scheduler = selector.create_scheduled_executor("scheduler");
        let (tx, rx) = mpsc::channel();

        scheduler
            .schedule(Duration::ZERO, move || {
                tx.send(std::thread::current().name().unwrap().to_string()).unwrap()
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "scheduler-0");
    }

    #[test]
    fn configured_worker_count_sizes_the_lightweight_runtime() {
        let mut store = crate::config::ConfigStore::new();
        store.set(crate::config::LIGHTWEIGHT_WORKER_THREADS, "3");
        let config = RuntimeConfig::from_snapshot(&store.snapshot()).unwrap();

        let selector = ExecutorSelector::new(config);

        assert!(!Arc::ptr_eq(selector.capability(), &Capability::global()));
        assert_eq!(selector.capability().runtime().unwrap().worker_threads(), 3);
    }

    #[test]
    fn unsized_selector_shares_the_global_capability() {
        let selector = ExecutorSelector::new(RuntimeConfig::default());
        assert!(Arc::ptr_eq(selector.capability(), &Capability::global()));
    }

    #[test]
    #[traced_test]
    fn lightweight_server_pool_is_announced_once() {
        let (selector, _) = selector(true, true);

        for _ in 0..3 {
            selector.create_server_thread_pool("server");
        }

        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains(NOTICE)).count() {
                1 => Ok(()),
                n => Err(format!("expected one startup notice, saw {n}")),
            }
        });
    }

    #[test]
    #[traced_test]
    fn pooled_server_pool_is_not_announced() {
        let (selector, _) = selector(true, false);
        selector.create_server_thread_pool("server");
        assert!(!logs_contain(NOTICE));
    }
}
