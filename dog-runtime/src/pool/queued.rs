use std::time::Duration;

use tracing::info;

use crate::config::PoolConfig;
use crate::executor::{Executor, ExecutorKind, PooledExecutor, Task};
use crate::pool::ThreadPool;
use crate::RuntimeResult;

/// Bounded server pool of named OS threads.
#[derive(Debug, Clone)]
pub struct QueuedThreadPool {
    pool: PooledExecutor,
}

impl QueuedThreadPool {
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            pool: PooledExecutor::new(name, config),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.pool.config().max_threads.unwrap_or(usize::MAX)
    }

    pub fn min_threads(&self) -> usize {
        self.pool.config().min_threads
    }

    pub fn idle_timeout(&self) -> Duration {
        self.pool.config().idle_timeout
    }

    pub fn queue_size(&self) -> usize {
        self.pool.stats().queued
    }

    pub fn busy_threads(&self) -> usize {
        let stats = self.pool.stats();
        stats.threads.saturating_sub(stats.idle)
    }
}

impl ThreadPool for QueuedThreadPool {
    fn name(&self) -> &str {
        self.pool.name()
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Pooled
    }

    fn start(&self) -> RuntimeResult<()> {
        let started = self.pool.prestart()?;
        info!(
            pool = %self.pool.name(),
            started,
            min = self.min_threads(),
            max = self.max_threads(),
            "server thread pool started"
        );
        Ok(())
    }

    fn execute(&self, task: Task) -> RuntimeResult<()> {
        self.pool.execute(task)
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn join(&self) {
        self.pool.join();
    }

    fn threads(&self) -> usize {
        self.pool.stats().threads
    }

    fn idle_threads(&self) -> usize {
        self.pool.stats().idle
    }

    /// Spare capacity (threads we could still start plus idle ones, minus
    /// queued work) has dropped to the low-threads threshold.
    fn is_low_on_threads(&self) -> bool {
        let stats = self.pool.stats();
        let config = self.pool.config();
        let Some(max) = config.max_threads else {
            return false;
        };
        let spare = (max + stats.idle) as i64 - stats.threads as i64 - stats.queued as i64;
        spare <= config.low_threads_threshold as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn server_defaults_are_exact() {
        let pool = QueuedThreadPool::new("server", PoolConfig::server());
        assert_eq!(pool.max_threads(), 250);
        assert_eq!(pool.min_threads(), 8);
        assert_eq!(pool.idle_timeout(), Duration::from_millis(60_000));
        assert_eq!(pool.kind(), ExecutorKind::Pooled);
    }

    #[test]
    fn start_prestarts_min_threads() {
        let pool = QueuedThreadPool::new("server", PoolConfig::server());
        pool.start().unwrap();
        assert_eq!(pool.threads(), 8);

        pool.shutdown();
        pool.join();
        assert_eq!(pool.threads(), 0);
    }

    #[test]
    fn low_on_threads_when_saturated() {
        let config = PoolConfig::server().with_min_threads(0).with_max_threads(2);
        let pool = QueuedThreadPool::new("tiny", config);
        assert!(!pool.is_low_on_threads());

        let gate = Arc::new(Barrier::new(3));
        let (tx, rx) = mpsc::channel();
        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                tx.send(()).unwrap();
                gate.wait();
            }))
            .unwrap();
        }
        rx.recv_timeout(WAIT).unwrap();
        rx.recv_timeout(WAIT).unwrap();

        assert_eq!(pool.busy_threads(), 2);
        assert!(pool.is_low_on_threads());

        gate.wait();
        pool.shutdown();
        pool.join();
    }
}
