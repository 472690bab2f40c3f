//! IoConfig — tunables for bridging operations.
//!
//! Parsed from the `[io]` table of a TOML file or built in code with the
//! `with_*` builder methods. Every field has a default, so an empty table is
//! a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::charset::Charset;
use crate::error::{Error, Result};
use crate::pipe::DEFAULT_PIPE_CAPACITY;

/// Configuration shared by the push-to-pull bridge and the channel adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Pipe capacity in units (bytes or chars). This is the backpressure
    /// knob: `0` makes every write a direct hand-off to the reader.
    pub pipe_capacity: usize,
    /// Upper bound for any single blocking wait in a pipe or readiness wait.
    /// `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
    /// Default charset label for callers that convert between text and
    /// bytes, such as `wirepipe cat`. Content producers carry their own
    /// charset and do not read this field.
    pub charset: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            timeout_ms: None,
            charset: "UTF-8".to_string(),
        }
    }
}

impl IoConfig {
    /// Load from a TOML file containing the fields at top level.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: IoConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configured charset resolves.
    pub fn validate(&self) -> Result<()> {
        Charset::for_name(&self.charset)?;
        Ok(())
    }

    /// The configured timeout as a `Duration`.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Resolve the configured charset.
    pub fn charset(&self) -> Result<Charset> {
        Charset::for_name(&self.charset)
    }

    /// Builder method: set the pipe capacity.
    pub fn with_pipe_capacity(self, pipe_capacity: usize) -> Self {
        Self {
            pipe_capacity,
            ..self
        }
    }

    /// Builder method: bound blocking waits.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout_ms: Some(timeout.as_millis() as u64),
            ..self
        }
    }

    /// Builder method: set the charset label.
    pub fn with_charset(self, charset: &str) -> Self {
        Self {
            charset: charset.to_string(),
            ..self
        }
    }
}
