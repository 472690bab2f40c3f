//! `wirepipe copy` — file to file, zero-copy by default.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

pub fn copy(src: &Path, dst: &Path, buffered: bool) -> Result<u64> {
    let source = File::open(src).with_context(|| format!("failed to open {}", src.display()))?;
    let mut target =
        File::create(dst).with_context(|| format!("failed to create {}", dst.display()))?;

    let bytes = if buffered {
        wirepipe::copy_bytes(source, &mut target)?
    } else {
        wirepipe::transfer_file(&source, &mut target)?
    };
    info!(
        src = %src.display(),
        dst = %dst.display(),
        bytes,
        mode = if buffered { "buffered" } else { "zero-copy" },
        "copy complete"
    );
    Ok(bytes)
}
