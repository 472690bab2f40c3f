//! Worker pool — a bounded [`Scheduler`] for copy tasks.
//!
//! Every bridging operation occupies one worker for as long as its producer
//! runs. The pool caps how many run at once (`max_in_flight`); further
//! submissions queue until a worker frees up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use wirepipe::{Scheduler, Task};

use crate::error::{PoolError, PoolResult};

/// Configuration for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of copy tasks running concurrently.
    pub max_in_flight: usize,
    /// Name given to worker threads.
    pub thread_name: String,
    /// How long [`WorkerPool::shutdown`] waits for running tasks.
    pub shutdown_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            thread_name: "wirepipe-worker".to_string(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    pub fn with_max_in_flight(self, max_in_flight: usize) -> Self {
        Self {
            max_in_flight,
            ..self
        }
    }

    pub fn with_thread_name(self, thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..self
        }
    }

    pub fn with_shutdown_timeout(self, timeout: Duration) -> Self {
        Self {
            shutdown_timeout_ms: timeout.as_millis() as u64,
            ..self
        }
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_in_flight == 0 {
            return Err(PoolError::InvalidConfig(
                "max_in_flight must be at least 1".into(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(PoolError::InvalidConfig("thread_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub running: u64,
    pub completed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
}

/// Marks a task as running; counts it completed when dropped, even if the
/// task panicked.
struct Running(Arc<Counters>);

impl Running {
    fn start(counters: Arc<Counters>) -> Self {
        counters.running.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
        self.0.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bounded pool of worker threads backed by a dedicated tokio runtime's
/// blocking pool.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    config: PoolConfig,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_in_flight)
            .thread_name(config.thread_name.clone())
            .build()?;
        info!(
            max_in_flight = config.max_in_flight,
            thread_name = %config.thread_name,
            "worker pool started"
        );
        Ok(Self {
            runtime: Some(runtime),
            config,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn max_in_flight(&self) -> usize {
        self.config.max_in_flight
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
        }
    }

    /// Stop accepting work and wait up to the configured timeout for
    /// running tasks. Tasks still running afterwards are left detached.
    pub fn shutdown(mut self) -> PoolResult<PoolStats> {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(self.config.shutdown_timeout());
        }
        let stats = self.stats();
        if stats.running > 0 {
            warn!(running = stats.running, "worker pool shutdown timed out");
            return Err(PoolError::ShutdownTimedOut {
                running: stats.running,
            });
        }
        info!(completed = stats.completed, "worker pool shut down");
        Ok(stats)
    }
}

impl Scheduler for WorkerPool {
    fn submit(&self, task: Task) -> wirepipe::Result<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| wirepipe::Error::Scheduler("worker pool is shut down".into()))?;
        let submitted = self.counters.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        let counters = Arc::clone(&self.counters);
        drop(runtime.spawn_blocking(move || {
            let _running = Running::start(counters);
            task();
        }));
        debug!(submitted, "copy task queued on worker pool");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Barrier, Mutex};
    use std::thread;

    #[test]
    fn config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_in_flight, 16);
        assert_eq!(config.thread_name, "wirepipe-worker");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn config_builders() {
        let config = PoolConfig::default()
            .with_max_in_flight(2)
            .with_thread_name("copier")
            .with_shutdown_timeout(Duration::from_millis(250));
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.thread_name, "copier");
        assert_eq!(config.shutdown_timeout_ms, 250);
    }

    #[test]
    fn zero_in_flight_is_rejected() {
        let err = WorkerPool::new(PoolConfig::default().with_max_in_flight(0)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn runs_tasks_on_named_workers() {
        let pool = WorkerPool::new(PoolConfig::default().with_thread_name("wp-test")).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            tx.send(thread::current().name().map(str::to_owned)).unwrap();
        }))
        .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("wp-test"));
        let stats = pool.shutdown().unwrap();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn concurrency_is_capped() {
        let cap = 2;
        let pool = WorkerPool::new(PoolConfig::default().with_max_in_flight(cap)).unwrap();
        let active = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(Mutex::new(0u64));
        let (tx, rx) = mpsc::channel();

        for _ in 0..8 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            pool.submit(Box::new(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    let mut peak = peak.lock().unwrap();
                    *peak = (*peak).max(now);
                }
                thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            }))
            .unwrap();
        }
        for _ in 0..8 {
            rx.recv().unwrap();
        }
        assert!(*peak.lock().unwrap() <= cap as u64);
        assert_eq!(pool.shutdown().unwrap().completed, 8);
    }

    #[test]
    fn shutdown_reports_stuck_tasks() {
        let pool = WorkerPool::new(
            PoolConfig::default().with_shutdown_timeout(Duration::from_millis(20)),
        )
        .unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let started = Arc::clone(&barrier);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(Box::new(move || {
            started.wait();
            let _ = release_rx.recv();
        }))
        .unwrap();
        barrier.wait();

        let err = pool.shutdown().unwrap_err();
        assert!(matches!(err, PoolError::ShutdownTimedOut { running: 1 }));
        drop(release_tx);
    }
}
