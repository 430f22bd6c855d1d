//! Named worker threads.
//!
//! Every pool owns exactly one [`NamedThreadFactory`]. Threads are named
//! `<prefix>-<n>` where `n` counts up from 0 for the lifetime of the factory,
//! so a thread dump tells you which subsystem owns which worker.
//!
//! Threads run inside the tracing span that was current when the factory was
//! created, so worker logs stay attached to the subsystem that owns them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tracing::Span;

use crate::{RuntimeError, RuntimeResult};

#[derive(Debug)]
pub struct NamedThreadFactory {
    prefix: String,
    next: AtomicUsize,
    span: Span,
}

impl NamedThreadFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicUsize::new(0),
            span: Span::current(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reserve the next thread name.
    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }

    /// Number of names handed out so far
    pub fn created(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    /// Spawn a named thread running `f` with the default stack size.
    pub fn new_thread<F, T>(&self, f: F) -> RuntimeResult<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let name = self.next_name();
        let span = self.span.clone();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || span.in_scope(f))
            .map_err(|e| RuntimeError::Spawn {
                name,
                reason: e.to_string(),
            })
    }
}
