//! wirepipe-pool — bounded worker pool for push-to-pull bridging.
//!
//! [`WorkerPool`] implements [`wirepipe::Scheduler`] on a dedicated tokio
//! runtime whose blocking pool is capped at
//! [`PoolConfig::max_in_flight`]. Use it instead of
//! [`wirepipe::ThreadPerTask`] wherever many bridging operations may run
//! at once.

mod error;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
