//! Scheduler contract consumed by the push-to-pull bridge.
//!
//! Bridging never creates threads on its own. Callers pass a [`Scheduler`]
//! into every bridging call: a bounded pool (`wirepipe-pool`), a tokio
//! runtime [`Handle`], or, as an explicit and logged fallback,
//! [`ThreadPerTask`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tokio::runtime::Handle;

use crate::error::{Error, Result};

/// A unit of work run once on some worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs units of work asynchronously. Submission is fire-and-forget.
pub trait Scheduler: Send + Sync {
    /// Queue `task` for execution. An `Err` means the task was dropped
    /// without running.
    fn submit(&self, task: Task) -> Result<()>;
}

impl<S: Scheduler + ?Sized> Scheduler for std::sync::Arc<S> {
    fn submit(&self, task: Task) -> Result<()> {
        (**self).submit(task)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    fn submit(&self, task: Task) -> Result<()> {
        (**self).submit(task)
    }
}

/// Runs tasks on the runtime's blocking pool, which is bounded by the
/// runtime's `max_blocking_threads`.
impl Scheduler for Handle {
    fn submit(&self, task: Task) -> Result<()> {
        drop(self.spawn_blocking(task));
        Ok(())
    }
}

/// Fallback scheduler: one dedicated OS thread per task.
///
/// Costly under concurrency; every submission logs a warning so that
/// production call sites get routed to a bounded scheduler instead.
#[derive(Debug, Default)]
pub struct ThreadPerTask {
    spawned: AtomicU64,
}

impl ThreadPerTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threads spawned so far.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Scheduler for ThreadPerTask {
    fn submit(&self, task: Task) -> Result<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            spawned = n,
            "no scheduler configured; spawning a dedicated thread for copy task"
        );
        thread::Builder::new()
            .name(format!("wirepipe-copy-{n}"))
            .spawn(task)
            .map(drop)
            .map_err(|e| Error::Scheduler(format!("failed to spawn copy thread: {e}")))
    }
}
