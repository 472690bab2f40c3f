//! `wirepipe cat` — stream a file through one of the bridges.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use tracing::debug;
use wirepipe::{copy_bytes, Bridge, Charset, Completion, EncodingReader, FileContent};
use wirepipe_pool::WorkerPool;

use super::config::CliConfig;

pub fn cat(
    config: &CliConfig,
    path: &Path,
    via: &str,
    charset: Option<&str>,
    out: &mut dyn Write,
) -> Result<u64> {
    let charset = Charset::for_name(charset.unwrap_or(&config.io.charset))?;
    let content = FileContent::new(path).with_charset(charset);

    let pool = WorkerPool::new(config.pool.clone())?;
    let bridge = Bridge::new(&pool).with_config(config.io.clone());

    let (bytes, completion) = match via {
        "bytes" => {
            let (source, completion) = bridge.byte_source(content)?.into_parts();
            (copy_bytes(source, out)?, completion)
        }
        "chars" => {
            let (source, completion) = bridge.char_source(content)?.into_parts();
            (copy_bytes(EncodingReader::new(source, charset), out)?, completion)
        }
        "channel" => {
            let (source, completion) = bridge.channel_source(content)?.into_parts();
            (copy_bytes(source, out)?, completion)
        }
        other => bail!("unknown bridge {other:?}; expected bytes, chars or channel"),
    };

    // The stream alone cannot tell a short file from a failed producer.
    completion.map(Completion::wait_blocking).transpose()?;
    drop(bridge);
    pool.shutdown()?;
    debug!(path = %path.display(), via, bytes, "cat complete");
    Ok(bytes)
}
