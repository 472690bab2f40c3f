//! Error types for pipes, channel adapters and bridging operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::readiness::Interest;

/// Result type alias for wirepipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while moving content between producers and consumers.
#[derive(Debug, Error)]
pub enum Error {
    /// The content producer failed while writing itself into a sink.
    ///
    /// Never surfaced on a bridged read path; only through
    /// [`Completion`](crate::Completion) and the failure reporter.
    #[error("content producer failed: {0}")]
    ProducerFailure(io::Error),

    #[error("broken pipe: the reading end was closed")]
    BrokenPipe,

    #[error("write after end of stream was signaled")]
    WriteAfterEnd,

    #[error("channel closed while waiting for {0} readiness")]
    ChannelClosed(Interest),

    #[error("channel cannot be registered for readiness: {0}")]
    NotSelectable(io::Error),

    #[error("another waiter is already registered for {0} readiness on this channel")]
    AlreadyWaiting(Interest),

    #[error("unsupported character set: {0}")]
    EncodingFailure(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The `io::ErrorKind` this error maps to when it crosses a
    /// `std::io::Read` / `std::io::Write` boundary.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Error::ProducerFailure(e) | Error::Io(e) => e.kind(),
            Error::BrokenPipe | Error::WriteAfterEnd => io::ErrorKind::BrokenPipe,
            Error::ChannelClosed(_) => io::ErrorKind::NotConnected,
            Error::NotSelectable(_) => io::ErrorKind::Unsupported,
            Error::AlreadyWaiting(_) => io::ErrorKind::ResourceBusy,
            Error::EncodingFailure(_) | Error::Config(_) => io::ErrorKind::InvalidInput,
            Error::TimedOut(_) => io::ErrorKind::TimedOut,
            Error::Scheduler(_) => io::ErrorKind::Other,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(other.kind(), other),
        }
    }
}
