//! Single-threaded scheduler for delayed and periodic housekeeping.
//!
//! All work runs on one worker thread named `<name>-0`, so scheduled tasks
//! never race each other. A long-running task delays everything behind it.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::executor::{Executor, ExecutorKind, Task, TaskFuture};
use crate::thread_factory::NamedThreadFactory;
use crate::{RuntimeError, RuntimeResult};

type PeriodicTask = Box<dyn FnMut() + Send + 'static>;

/// Delays too large to represent as an `Instant` are clamped to this.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline(from: Instant, after: Duration) -> Instant {
    from.checked_add(after)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

enum Job {
    Once(Task),
    FixedRate { period: Duration, task: PeriodicTask },
    FixedDelay { delay: Duration, task: PeriodicTask },
}

struct Entry {
    at: Instant,
    seq: u64,
    job: Job,
    cancelled: Arc<AtomicBool>,
}

impl Entry {
    fn is_periodic(&self) -> bool {
        !matches!(self.job, Job::Once(_))
    }
}

// BinaryHeap is a max-heap; earliest deadline (then lowest seq) must pop first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

/// Handle to a scheduled task
#[derive(Debug, Clone)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    /// Prevent future runs. A run already in progress finishes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct SchedState {
    queue: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
    worker_alive: bool,
}

struct SchedInner {
    name: String,
    factory: NamedThreadFactory,
    state: Mutex<SchedState>,
    wakeup: Condvar,
    terminated: Condvar,
}

/// Dropping the last clone shuts the scheduler down, as [`Executor::shutdown`] does.
#[derive(Clone)]
pub struct ScheduledExecutor {
    inner: Arc<SchedHandle>,
}

/// Held by executor clones only. The worker keeps `SchedInner` alive directly.
struct SchedHandle(Arc<SchedInner>);

impl Deref for SchedHandle {
    type Target = SchedInner;

    fn deref(&self) -> &SchedInner {
        &self.0
    }
}

impl Drop for SchedHandle {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

impl ScheduledExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(SchedHandle(Arc::new(SchedInner {
                factory: NamedThreadFactory::new(name.clone()),
                name,
                state: Mutex::new(SchedState::default()),
                wakeup: Condvar::new(),
                terminated: Condvar::new(),
            }))),
        }
    }

    /// Run `f` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> RuntimeResult<ScheduledHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(deadline(Instant::now(), delay), Job::Once(Box::new(f)))
    }

    /// Run `f` after `initial`, then every `period` measured from each scheduled start.
    pub fn schedule_at_fixed_rate<F>(&self, initial: Duration, period: Duration, f: F) -> RuntimeResult<ScheduledHandle>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(RuntimeError::invalid_config("period", "0"));
        }
        self.submit(
            deadline(Instant::now(), initial),
            Job::FixedRate {
                period,
                task: Box::new(f),
            },
        )
    }

    /// Run `f` after `initial`, then `delay` after each run finishes.
    pub fn schedule_with_fixed_delay<F>(&self, initial: Duration, delay: Duration, f: F) -> RuntimeResult<ScheduledHandle>
    where
        F: FnMut() + Send + 'static,
    {
        if delay.is_zero() {
            return Err(RuntimeError::invalid_config("delay", "0"));
        }
        self.submit(
            deadline(Instant::now(), initial),
            Job::FixedDelay {
                delay,
                task: Box::new(f),
            },
        )
    }

    /// Tasks waiting to run, cancelled ones included until they are reached
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Discard everything pending and stop. Returns the number of tasks discarded.
    pub fn shutdown_now(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        let dropped = state.queue.len();
        state.queue.clear();
        self.inner.wakeup.notify_all();
        dropped
    }

    /// Block until shut down and the worker thread has exited.
    pub fn join(&self) {
        let mut state = self.inner.state.lock();
        while !state.shutdown || state.worker_alive {
            self.inner.terminated.wait(&mut state);
        }
    }

    fn submit(&self, at: Instant, job: Job) -> RuntimeResult<ScheduledHandle> {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return Err(RuntimeError::shutdown(&self.inner.name));
        }

        if !state.worker_alive {
            let worker = Arc::clone(&self.inner.0);
            self.inner.factory.new_thread(move || worker.run())?;
            state.worker_alive = true;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Entry {
            at,
            seq,
            job,
            cancelled: Arc::clone(&cancelled),
        });
        self.inner.wakeup.notify_one();

        Ok(ScheduledHandle { cancelled })
    }
}

impl SchedInner {
    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        state.queue.retain(|e| !e.is_periodic());
        debug!(scheduler = %self.name, pending = state.queue.len(), "scheduler shutting down");
        self.wakeup.notify_all();
        if !state.worker_alive {
            self.terminated.notify_all();
        }
    }

    fn run(&self) {
        debug!(scheduler = %self.name, "scheduler started");

        while let Some(entry) = self.next_due() {
            let Entry { at, job, cancelled, .. } = entry;

            let (next, completed) = match job {
                Job::Once(task) => (None, catch_unwind(AssertUnwindSafe(task)).is_ok()),
                Job::FixedRate { period, mut task } => {
                    let ok = catch_unwind(AssertUnwindSafe(&mut task)).is_ok();
                    (Some((deadline(at, period), Job::FixedRate { period, task })), ok)
                }
                Job::FixedDelay { delay, mut task } => {
                    let ok = catch_unwind(AssertUnwindSafe(&mut task)).is_ok();
                    (Some((deadline(Instant::now(), delay), Job::FixedDelay { delay, task })), ok)
                }
            };

            if !completed {
                // a periodic task that panics is not run again
                error!(scheduler = %self.name, "scheduled task panicked");
                continue;
            }

            if let Some((at, job)) = next {
                let mut state = self.state.lock();
                if !state.shutdown && !cancelled.load(Ordering::Acquire) {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.queue.push(Entry { at, seq, job, cancelled });
                }
            }
        }

        let mut state = self.state.lock();
        state.worker_alive = false;
        self.terminated.notify_all();
        debug!(scheduler = %self.name, "scheduler stopped");
    }

    /// Wait for the next due, non-cancelled entry. None once shut down and drained.
    fn next_due(&self) -> Option<Entry> {
        let mut state = self.state.lock();
        loop {
            while state
                .queue
                .peek()
                .is_some_and(|e| e.cancelled.load(Ordering::Acquire))
            {
                state.queue.pop();
            }

            let now = Instant::now();
            match state.queue.peek().map(|e| e.at) {
                Some(at) if at <= now => return state.queue.pop(),
                Some(at) => {
                    self.wakeup.wait_until(&mut state, at);
                }
                None if state.shutdown => return None,
                None => {
                    self.wakeup.wait(&mut state);
                }
            }
        }
    }
}

impl Executor for ScheduledExecutor {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Pooled
    }

    fn execute(&self, task: Task) -> RuntimeResult<()> {
        self.submit(Instant::now(), Job::Once(task)).map(|_| ())
    }

    fn spawn(&self, future: TaskFuture) -> RuntimeResult<()> {
        self.execute(Box::new(move || futures::executor::block_on(future)))
    }

    /// Stop periodic tasks; one-shot tasks already scheduled still run.
    fn shutdown(&self) {
        self.inner.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }
}

impl std::fmt::Debug for ScheduledExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledExecutor")
            .field("name", &self.inner.name)
            .field("pending", &self.pending())
            .finish()
    }
}
