use thiserror::Error;

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("shutdown timed out with {running} task(s) still running")]
    ShutdownTimedOut { running: u64 },
}
