//! Lightweight task capability detection.
//!
//! A [`Capability`] runs its [`CapabilityProbe`] at most once. A successful
//! probe yields the [`LightweightRuntime`] that every lightweight executor
//! created from this capability shares; a failed or panicking probe is
//! downgraded to "unavailable" and never surfaces to callers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

use crate::thread_factory::NamedThreadFactory;
use crate::{RuntimeError, RuntimeResult};

static GLOBAL: Lazy<Arc<Capability>> = Lazy::new(|| Arc::new(Capability::new(TokioProbe::default())));

/// Multi-threaded tokio runtime backing lightweight executors.
pub struct LightweightRuntime {
    runtime: Option<Runtime>,
    handle: Handle,
    worker_threads: usize,
}

impl LightweightRuntime {
    /// Build a multi-threaded runtime whose workers are named `<prefix>-<n>`.
    pub fn build(prefix: &str, worker_threads: Option<usize>) -> RuntimeResult<Self> {
        let workers = worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        let names = NamedThreadFactory::new(prefix);

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name_fn(move || names.next_name())
            .enable_all()
            .build()?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            worker_threads: workers,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }
}

impl std::fmt::Debug for LightweightRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightweightRuntime")
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

impl Drop for LightweightRuntime {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside async contexts.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Strategy deciding whether lightweight tasks can be used.
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> RuntimeResult<LightweightRuntime>;
}

/// Probe that builds a dedicated multi-threaded tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioProbe {
    pub thread_prefix: String,
    pub worker_threads: Option<usize>,
}

impl Default for TokioProbe {
    fn default() -> Self {
        Self {
            thread_prefix: "lightweight".to_string(),
            worker_threads: None,
        }
    }
}

impl TokioProbe {
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }
}

impl CapabilityProbe for TokioProbe {
    fn probe(&self) -> RuntimeResult<LightweightRuntime> {
        LightweightRuntime::build(&self.thread_prefix, self.worker_threads)
    }
}

/// Probe for targets without lightweight task support.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProbe;

impl CapabilityProbe for DisabledProbe {
    fn probe(&self) -> RuntimeResult<LightweightRuntime> {
        Err(RuntimeError::Unsupported("disabled for this target".to_string()))
    }
}

/// Memoized result of a [`CapabilityProbe`].
pub struct Capability {
    probe: Box<dyn CapabilityProbe>,
    runtime: OnceCell<Option<Arc<LightweightRuntime>>>,
    announced: AtomicBool,
}

impl Capability {
    pub fn new(probe: impl CapabilityProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            runtime: OnceCell::new(),
            announced: AtomicBool::new(false),
        }
    }

    /// Capability that always reports unavailable.
    pub fn disabled() -> Self {
        Self::new(DisabledProbe)
    }

    /// Process-wide capability backed by [`TokioProbe`].
    pub fn global() -> Arc<Capability> {
        Arc::clone(&GLOBAL)
    }

    /// Whether lightweight tasks are usable. Probes on first call only.
    pub fn is_available(&self) -> bool {
        self.runtime().is_some()
    }

    /// Shared runtime produced by the probe, if it succeeded.
    pub fn runtime(&self) -> Option<Arc<LightweightRuntime>> {
        self.runtime
            .get_or_init(|| match catch_unwind(AssertUnwindSafe(|| self.probe.probe())) {
                Ok(Ok(runtime)) => {
                    debug!(workers = runtime.worker_threads(), "lightweight tasks available");
                    Some(Arc::new(runtime))
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "lightweight tasks unavailable");
                    None
                }
                Err(_) => {
                    warn!("capability probe panicked, falling back to pooled threads");
                    None
                }
            })
            .clone()
    }

    /// Whether the probe has already run.
    pub fn is_probed(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// Returns true exactly once per capability, for one-time startup notices.
    pub(crate) fn claim_announcement(&self) -> bool {
        !self.announced.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("probed", &self.is_probed())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// Probe that counts invocations and delegates to a fixed answer.
    pub(crate) struct CountingProbe {
        pub calls: Arc<AtomicUsize>,
        pub available: bool,
    }

    impl CountingProbe {
        pub(crate) fn new(available: bool) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                    available,
                },
                calls,
            )
        }
    }

    impl CapabilityProbe for CountingProbe {
        fn probe(&self) -> RuntimeResult<LightweightRuntime> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.available {
                LightweightRuntime::build("probe-test", Some(2))
            } else {
                Err(RuntimeError::Unsupported("test".to_string()))
            }
        }
    }

    struct PanickingProbe;

    impl CapabilityProbe for PanickingProbe {
        fn probe(&self) -> RuntimeResult<LightweightRuntime> {
            panic!("probe exploded")
        }
    }

    #[test]
    fn probe_runs_once_under_concurrent_first_use() {
        let (probe, calls) = CountingProbe::new(true);
        let capability = Arc::new(Capability::new(probe));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let capability = Arc::clone(&capability);
                thread::spawn(move || capability.is_available())
            })
            .collect();

        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.iter().all(|&available| available));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(capability.is_available());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_probe_is_memoized_as_unavailable() {
        let (probe, calls) = CountingProbe::new(false);
        let capability = Capability::new(probe);

        assert!(!capability.is_probed());
        assert!(!capability.is_available());
        assert!(!capability.is_available());
        assert!(capability.is_probed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_probe_reports_unavailable() {
        let capability = Capability::new(PanickingProbe);
        assert!(!capability.is_available());
    }

    #[test]
    fn disabled_capability_is_unavailable() {
        assert!(!Capability::disabled().is_available());
    }

    #[test]
    fn successful_probe_shares_one_runtime() {
        let capability = Capability::new(TokioProbe::default().with_worker_threads(1));
        let first = capability.runtime().unwrap();
        let second = capability.runtime().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.worker_threads(), 1);
    }

    #[test]
    fn announcement_is_claimed_once() {
        let capability = Capability::disabled();
        assert!(capability.claim_announcement());
        assert!(!capability.claim_announcement());
    }
}
