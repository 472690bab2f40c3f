//! Failure reporting for errors that never reach a reader.
//!
//! A bridged reader only observes a truncated stream when its producer
//! fails; the failure itself goes to a [`FailureReporter`]. The default,
//! [`TracingReporter`], emits a `tracing` event.

use std::error::Error as StdError;
use std::fmt;

/// Severity of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Receives `(severity, message, cause)` for swallowed failures.
pub trait FailureReporter: Send + Sync {
    fn report(&self, severity: Severity, message: &str, cause: &(dyn StdError + 'static));
}

/// Forwards reports to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, severity: Severity, message: &str, cause: &(dyn StdError + 'static)) {
        match severity {
            Severity::Debug => tracing::debug!(error = %cause, "{message}"),
            Severity::Info => tracing::info!(error = %cause, "{message}"),
            Severity::Warn => tracing::warn!(error = %cause, "{message}"),
            Severity::Error => tracing::error!(error = %cause, "{message}"),
        }
    }
}
