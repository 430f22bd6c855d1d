//! # dog-runtime: adaptive executors for DogRS servers
//!
//! DogRS services run their work either on **lightweight tasks** (many cheap
//! tasks multiplexed over a few OS threads by a multi-threaded tokio runtime)
//! or on **named thread pools** when lightweight tasks are unavailable or
//! turned off. The decision is made once per process by probing the runtime,
//! and every subsystem ("server", "scheduler", ...) asks the same
//! [`ExecutorSelector`] for its executor.
//!
//! ```rust
//! use dog_runtime::prelude::*;
//!
//! let selector = ExecutorSelector::new(RuntimeConfig::default());
//!
//! let server_pool = selector.create_server_thread_pool("server");
//! server_pool.start().unwrap();
//! server_pool.submit(|| println!("handling a connection")).unwrap();
//!
//! let housekeeping = selector.create_scheduled_executor("scheduler");
//! housekeeping
//!     .schedule(std::time::Duration::from_secs(30), || println!("cleanup"))
//!     .unwrap();
//! # housekeeping.shutdown_now();
//! ```
//!
//! Disable lightweight tasks with `runtime.prefer_lightweight = false`
//! (or `DOG_RUNTIME__PREFER_LIGHTWEIGHT=false`) before the first factory call.

pub mod capability;
pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod scheduled;
pub mod selector;
pub mod thread_factory;

pub use capability::{Capability, CapabilityProbe, DisabledProbe, LightweightRuntime, TokioProbe};
pub use config::{ConfigSnapshot, ConfigStore, PoolConfig, RuntimeConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use executor::{Executor, ExecutorKind, LightweightExecutor, PooledExecutor, Task, TaskFuture};
pub use pool::{LightweightThreadPool, QueuedThreadPool, ThreadPool};
pub use scheduled::{ScheduledExecutor, ScheduledHandle};
pub use selector::ExecutorSelector;
pub use thread_factory::NamedThreadFactory;

pub mod prelude {
    pub use crate::{
        Executor, ExecutorKind, ExecutorSelector, RuntimeConfig, RuntimeError, RuntimeResult,
        ScheduledExecutor, ThreadPool,
    };
}
