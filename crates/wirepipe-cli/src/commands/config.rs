//! CLI configuration file.
//!
//! ```toml
//! [io]
//! pipe_capacity = 8192
//! timeout_ms = 30000
//! charset = "UTF-8"
//!
//! [pool]
//! max_in_flight = 4
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use wirepipe::IoConfig;
use wirepipe_pool::PoolConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub io: IoConfig,
    pub pool: PoolConfig,
}

impl CliConfig {
    /// Load from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(content)?;
        config.io.validate()?;
        config.pool.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
    }

    #[test]
    fn reads_both_tables() {
        let config = CliConfig::parse(
            r#"
[io]
pipe_capacity = 0
timeout_ms = 1500

[pool]
max_in_flight = 3
"#,
        )
        .unwrap();
        assert_eq!(config.io.pipe_capacity, 0);
        assert_eq!(config.io.timeout_ms, Some(1500));
        assert_eq!(config.pool.max_in_flight, 3);
        assert_eq!(config.pool.thread_name, "wirepipe-worker");
    }

    #[test]
    fn rejects_unknown_charset_and_zero_pool() {
        assert!(CliConfig::parse("[io]\ncharset = \"klingon\"\n").is_err());
        assert!(CliConfig::parse("[pool]\nmax_in_flight = 0\n").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[io]\ncharset = \"latin1\"").unwrap();
        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.io.charset, "latin1");
        assert!(CliConfig::load(None).unwrap() == CliConfig::default());
    }
}
