use std::collections::VecDeque;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::config::PoolConfig;
use crate::executor::{Executor, ExecutorKind, Task, TaskFuture};
use crate::thread_factory::NamedThreadFactory;
use crate::{RuntimeError, RuntimeResult};

/// Executor backed by reusable named worker threads.
///
/// Threads are started on demand when queued work outnumbers idle workers,
/// up to `max_threads`. Threads above `min_threads` exit after sitting idle
/// for `idle_timeout`. The queue itself is unbounded.
///
/// Dropping the last clone shuts the pool down: queued work still runs, then
/// every worker exits.
#[derive(Clone)]
pub struct PooledExecutor {
    inner: Arc<PoolHandle>,
}

/// Held by executor clones only. Workers keep `PoolInner` alive directly.
struct PoolHandle(Arc<PoolInner>);

impl Deref for PoolHandle {
    type Target = PoolInner;

    fn deref(&self) -> &PoolInner {
        &self.0
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

struct PoolInner {
    name: String,
    config: PoolConfig,
    factory: NamedThreadFactory,
    state: Mutex<PoolState>,
    work_available: Condvar,
    terminated: Condvar,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Task>,
    threads: usize,
    idle: usize,
    shutdown: bool,
}

/// Point-in-time counters of a pooled executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub threads: usize,
    pub idle: usize,
    pub queued: usize,
}

impl PooledExecutor {
    /// Pool whose threads are named `<name>-<n>`.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(PoolHandle(Arc::new(PoolInner {
                factory: NamedThreadFactory::new(name.clone()),
                name,
                config,
                state: Mutex::new(PoolState::default()),
                work_available: Condvar::new(),
                terminated: Condvar::new(),
            }))),
        }
    }

    /// Grow-on-demand pool with no upper bound.
    pub fn cached(name: impl Into<String>) -> Self {
        Self::new(name, PoolConfig::cached())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            threads: state.threads,
            idle: state.idle,
            queued: state.queue.len(),
        }
    }

    /// Start worker threads until at least `min_threads` exist.
    pub fn prestart(&self) -> RuntimeResult<usize> {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return Err(RuntimeError::shutdown(&self.inner.name));
        }
        let mut started = 0;
        while state.threads < self.inner.config.min_threads {
            PoolInner::spawn_worker(&self.inner.0, &mut state)?;
            started += 1;
        }
        Ok(started)
    }

    /// Stop accepting work and drop everything still queued.
    ///
    /// Returns the number of tasks that never ran.
    pub fn shutdown_now(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        let dropped = state.queue.len();
        state.queue.clear();
        self.inner.work_available.notify_all();
        dropped
    }

    /// Block until shut down and every worker thread has exited.
    pub fn join(&self) {
        let mut state = self.inner.state.lock();
        while !(state.shutdown && state.threads == 0) {
            self.inner.terminated.wait(&mut state);
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`. Returns true if terminated.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !(state.shutdown && state.threads == 0) {
            if self.inner.terminated.wait_until(&mut state, deadline).timed_out() {
                return state.shutdown && state.threads == 0;
            }
        }
        true
    }
}

impl PoolInner {
    fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            debug!(pool = %self.name, queued = state.queue.len(), "pool shutting down");
        }
        self.work_available.notify_all();
        if state.threads == 0 {
            self.terminated.notify_all();
        }
    }

    fn spawn_worker(inner: &Arc<PoolInner>, state: &mut PoolState) -> RuntimeResult<()> {
        let worker = Arc::clone(inner);
        inner.factory.new_thread(move || worker.run_worker())?;
        state.threads += 1;
        Ok(())
    }

    fn run_worker(&self) {
        debug!(pool = %self.name, "worker started");

        loop {
            let task = {
                let mut state = self.state.lock();
                let next = loop {
                    if let Some(task) = state.queue.pop_front() {
                        break Some(task);
                    }
                    if state.shutdown {
                        break None;
                    }

                    state.idle += 1;
                    let timed_out = self
                        .work_available
                        .wait_for(&mut state, self.config.idle_timeout)
                        .timed_out();
                    state.idle -= 1;

                    if timed_out && state.queue.is_empty() && state.threads > self.config.min_threads {
                        break None;
                    }
                };

                match next {
                    Some(task) => task,
                    None => {
                        state.threads -= 1;
                        if state.threads == 0 {
                            self.terminated.notify_all();
                        }
                        debug!(pool = %self.name, remaining = state.threads, "worker exiting");
                        return;
                    }
                }
            };

            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!(pool = %self.name, "task panicked");
            }
        }
    }
}

impl Executor for PooledExecutor {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Pooled
    }

    fn execute(&self, task: Task) -> RuntimeResult<()> {
        let inner = &self.inner.0;
        let mut state = inner.state.lock();
        if state.shutdown {
            return Err(RuntimeError::shutdown(&inner.name));
        }

        state.queue.push_back(task);

        let below_max = inner.config.max_threads.map_or(true, |max| state.threads < max);
        if state.queue.len() > state.idle && below_max {
            if let Err(e) = PoolInner::spawn_worker(inner, &mut state) {
                if state.threads == 0 {
                    state.queue.pop_back();
                    return Err(e);
                }
                warn!(pool = %inner.name, error = %e, "could not grow pool, task stays queued");
            }
        }

        if state.idle > 0 {
            inner.work_available.notify_one();
        }
        Ok(())
    }

    fn spawn(&self, future: TaskFuture) -> RuntimeResult<()> {
        self.execute(Box::new(move || futures::executor::block_on(future)))
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }
}

impl std::fmt::Debug for PooledExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledExecutor")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Barrier;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn workers_are_named_after_the_pool() {
        let pool = PooledExecutor::cached("svc");
        let (tx, rx) = mpsc::channel();

        for _ in 0..4 {
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                tx.send(std::thread::current().name().unwrap().to_string()).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..4 {
            assert!(rx.recv_timeout(WAIT).unwrap().starts_with("svc-"));
        }
    }

    #[test]
    fn idle_threads_are_reused() {
        let pool = PooledExecutor::cached("reuse");
        let (tx, rx) = mpsc::channel();

        for _ in 0..5 {
            let tx = tx.clone();
            pool.execute(Box::new(move || tx.send(()).unwrap())).unwrap();
            rx.recv_timeout(WAIT).unwrap();
            // let the worker park again before the next submission
            while pool.stats().idle == 0 {
                std::thread::yield_now();
            }
        }

        assert_eq!(pool.stats().threads, 1);
    }

    #[test]
    fn grows_to_run_blocking_tasks_in_parallel() {
        let pool = PooledExecutor::cached("grow");
        let barrier = Arc::new(Barrier::new(4));
        let (tx, rx) = mpsc::channel();

        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                barrier.wait();
                tx.send(()).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..4 {
            rx.recv_timeout(WAIT).unwrap();
        }
        assert_eq!(pool.stats().threads, 4);
    }

    #[test]
    fn max_threads_bounds_growth() {
        let pool = PooledExecutor::new("bounded", PoolConfig::cached().with_max_threads(2));
        let gate = Arc::new(Barrier::new(3));
        let (tx, rx) = mpsc::channel();

        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            pool.execute(Box::new(move || {
                gate.wait();
            }))
            .unwrap();
        }
        let tx2 = tx.clone();
        pool.execute(Box::new(move || tx2.send(()).unwrap())).unwrap();

        let deadline = std::time::Instant::now() + WAIT;
        while pool.stats().queued > 1 && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert_eq!(pool.stats().threads, 2);
        assert_eq!(pool.stats().queued, 1);

        gate.wait();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(pool.stats().threads, 2);
    }

    #[test]
    fn idle_threads_above_min_expire() {
        let config = PoolConfig::cached().with_idle_timeout(Duration::from_millis(20));
        let pool = PooledExecutor::new("expire", config);
        let (tx, rx) = mpsc::channel();

        pool.execute(Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(WAIT).unwrap();

        let deadline = std::time::Instant::now() + WAIT;
        while pool.stats().threads > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.stats().threads, 0);
    }

    #[test]
    fn prestart_keeps_min_threads() {
        let config = PoolConfig::server()
            .with_min_threads(3)
            .with_idle_timeout(Duration::from_millis(10));
        let pool = PooledExecutor::new("core", config);

        assert_eq!(pool.prestart().unwrap(), 3);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.stats().threads, 3);

        pool.shutdown();
        assert!(pool.join_timeout(WAIT));
    }

    #[test]
    fn panicking_task_does_not_kill_the_pool() {
        let pool = PooledExecutor::cached("panics");
        let (tx, rx) = mpsc::channel();

        pool.execute(Box::new(|| panic!("boom"))).unwrap();
        pool.execute(Box::new(move || tx.send(()).unwrap())).unwrap();

        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn shutdown_drains_queue_then_join_returns() {
        let pool = PooledExecutor::new("drain", PoolConfig::cached().with_max_threads(1));
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            pool.execute(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        pool.shutdown();
        assert!(pool.execute(Box::new(|| {})).unwrap_err().is_shutdown());

        pool.join();
        let ran: Vec<i32> = rx.try_iter().collect();
        assert_eq!(ran, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn futures_run_to_completion_on_workers() {
        let pool = PooledExecutor::cached("futures");
        let (tx, rx) = mpsc::channel();

        pool.spawn(Box::pin(async move {
            let value = async { 21 * 2 }.await;
            tx.send(value).unwrap();
        }))
        .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
    }

    #[test]
    fn dropping_the_last_handle_stops_core_threads() {
        let pool = PooledExecutor::new("dropped", PoolConfig::server().with_min_threads(2));
        let clone = pool.clone();
        assert_eq!(pool.prestart().unwrap(), 2);
        let inner = Arc::clone(&pool.inner.0);

        drop(pool);
        assert!(!inner.state.lock().shutdown);

        drop(clone);
        let deadline = std::time::Instant::now() + WAIT;
        while inner.state.lock().threads > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(inner.state.lock().shutdown);
        assert_eq!(inner.state.lock().threads, 0);
    }
}
