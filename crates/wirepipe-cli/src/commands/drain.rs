//! `wirepipe drain` — consume a file without keeping it.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use wirepipe::Drained;

pub fn drain(path: &Path) -> Result<Drained> {
    let source = match File::open(path) {
        Ok(file) => Some(file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };
    let drained = wirepipe::exhaust(source)?;
    match drained {
        Drained::Absent => info!(path = %path.display(), "source absent"),
        Drained::Consumed(bytes) => info!(path = %path.display(), bytes, "source drained"),
    }
    Ok(drained)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(drain(&dir.path().join("missing")).unwrap(), Drained::Absent);
    }

    #[test]
    fn existing_file_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body");
        std::fs::write(&path, vec![0u8; 5000]).unwrap();
        assert_eq!(drain(&path).unwrap(), Drained::Consumed(5000));
    }
}
