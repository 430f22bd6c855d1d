//! # Runtime configuration
//!
//! Executor selection is driven by a small typed [`RuntimeConfig`]. It can be
//! built in code, or read from the same string key/value store DogRS apps
//! already use for their settings:
//!
//! ```rust
//! use dog_runtime::config::{ConfigStore, RuntimeConfig};
//!
//! let mut store = ConfigStore::new();
//! store.set("runtime.prefer_lightweight", "false");
//! store.set("runtime.server.max_threads", "64");
//!
//! let config = RuntimeConfig::from_snapshot(&store.snapshot()).unwrap();
//! assert!(!config.prefer_lightweight);
//! assert_eq!(config.server_pool.max_threads, Some(64));
//! ```
//!
//! Environment overrides follow the `PREFIX__SECTION__KEY` convention:
//! `DOG_RUNTIME__PREFER_LIGHTWEIGHT=false` becomes `runtime.prefer_lightweight`
//! when loaded with prefix `DOG_`.

use std::collections::HashMap;
use std::time::Duration;

use crate::{RuntimeError, RuntimeResult};

pub const PREFER_LIGHTWEIGHT: &str = "runtime.prefer_lightweight";
pub const SERVER_MAX_THREADS: &str = "runtime.server.max_threads";
pub const SERVER_MIN_THREADS: &str = "runtime.server.min_threads";
pub const SERVER_IDLE_TIMEOUT_MS: &str = "runtime.server.idle_timeout_ms";
pub const LIGHTWEIGHT_WORKER_THREADS: &str = "runtime.lightweight.worker_threads";

/// String key/value settings store.
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: HashMap<String, String>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every environment variable starting with `prefix` into the store.
    ///
    /// `DOG_RUNTIME__SERVER__MAX_THREADS` → `runtime.server.max_threads`
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            map: self.values.clone(),
        }
    }
}

/// Read-only copy of a [`ConfigStore`] with typed getters.
///
/// Typed getters return `Ok(None)` for a missing key and `InvalidConfig` for
/// a value that does not parse.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    map: HashMap<String, String>,
}

impl ConfigSnapshot {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_bool(&self, key: &str) -> RuntimeResult<Option<bool>> {
        self.parse(key)
    }

    pub fn get_usize(&self, key: &str) -> RuntimeResult<Option<usize>> {
        self.parse(key)
    }

    pub fn get_u64(&self, key: &str) -> RuntimeResult<Option<u64>> {
        self.parse(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> RuntimeResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| RuntimeError::invalid_config(key, raw)),
        }
    }
}

/// Sizing for a pooled executor or queued thread pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Threads kept alive even when idle
    pub min_threads: usize,
    /// Upper bound on worker threads (None = grow on demand)
    pub max_threads: Option<usize>,
    /// How long a thread above `min_threads` may sit idle before exiting
    pub idle_timeout: Duration,
    /// `is_low_on_threads` fires when spare capacity drops to this
    pub low_threads_threshold: usize,
}

impl PoolConfig {
    /// Grow-on-demand pool: no core threads, no upper bound, 60s keep-alive.
    pub fn cached() -> Self {
        Self {
            min_threads: 0,
            max_threads: None,
            idle_timeout: Duration::from_secs(60),
            low_threads_threshold: 1,
        }
    }

    /// Bounded pool used by the HTTP server: 8..=250 threads, 60s idle timeout.
    pub fn server() -> Self {
        Self {
            min_threads: 8,
            max_threads: Some(250),
            idle_timeout: Duration::from_millis(60_000),
            low_threads_threshold: 1,
        }
    }

    pub fn with_min_threads(mut self, threads: usize) -> Self {
        self.min_threads = threads;
        self
    }

    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_low_threads_threshold(mut self, threshold: usize) -> Self {
        self.low_threads_threshold = threshold;
        self
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if let Some(max) = self.max_threads {
            if max == 0 {
                return Err(RuntimeError::invalid_config(SERVER_MAX_THREADS, "0"));
            }
            if self.min_threads > max {
                return Err(RuntimeError::invalid_config(
                    SERVER_MIN_THREADS,
                    format!("{} exceeds max_threads {}", self.min_threads, max),
                ));
            }
        }
        Ok(())
    }
}

/// Settings read by [`ExecutorSelector`](crate::ExecutorSelector).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeConfig {
    /// Use lightweight tasks when the runtime supports them
    pub prefer_lightweight: bool,
    /// Sizing of the fallback server thread pool
    pub server_pool: PoolConfig,
    /// Sizing of the fallback general-purpose executors
    pub executor_pool: PoolConfig,
    /// Worker threads of a dedicated lightweight runtime (None = the shared
    /// process-wide runtime, one worker per core)
    pub lightweight_worker_threads: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            prefer_lightweight: true,
            server_pool: PoolConfig::server(),
            executor_pool: PoolConfig::cached(),
            lightweight_worker_threads: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefer_lightweight(mut self, prefer: bool) -> Self {
        self.prefer_lightweight = prefer;
        self
    }

    pub fn with_server_pool(mut self, pool: PoolConfig) -> Self {
        self.server_pool = pool;
        self
    }

    pub fn with_executor_pool(mut self, pool: PoolConfig) -> Self {
        self.executor_pool = pool;
        self
    }

    pub fn with_lightweight_worker_threads(mut self, threads: usize) -> Self {
        self.lightweight_worker_threads = Some(threads);
        self
    }

    /// Overlay the keys present in `snapshot` on top of the defaults.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> RuntimeResult<Self> {
        let mut config = Self::default();

        if let Some(prefer) = snapshot.get_bool(PREFER_LIGHTWEIGHT)? {
            config.prefer_lightweight = prefer;
        }
        if let Some(max) = snapshot.get_usize(SERVER_MAX_THREADS)? {
            config.server_pool.max_threads = Some(max);
        }
        if let Some(min) = snapshot.get_usize(SERVER_MIN_THREADS)? {
            config.server_pool.min_threads = min;
        }
        if let Some(ms) = snapshot.get_u64(SERVER_IDLE_TIMEOUT_MS)? {
            config.server_pool.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(workers) = snapshot.get_usize(LIGHTWEIGHT_WORKER_THREADS)? {
            if workers == 0 {
                return Err(RuntimeError::invalid_config(LIGHTWEIGHT_WORKER_THREADS, "0"));
            }
            config.lightweight_worker_threads = Some(workers);
        }

        config.server_pool.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `<prefix>RUNTIME__*` environment variables.
    pub fn from_env(prefix: &str) -> RuntimeResult<Self> {
        let mut store = ConfigStore::new();
        store.load_env(prefix);
        Self::from_snapshot(&store.snapshot())
    }
}
