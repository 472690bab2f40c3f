//! Push-style content producers.
//!
//! A producer writes its whole content into a sink it is handed, once. The
//! bridge runs producers on a scheduler and turns their output into a
//! readable source. Closures with the matching signature are producers too:
//!
//! ```no_run
//! use std::io::Write;
//! use wirepipe::{bridge_to_byte_source, ThreadPerTask};
//!
//! let scheduler = ThreadPerTask::new();
//! let source = bridge_to_byte_source(
//!     |sink: &mut dyn Write| sink.write_all(b"hello"),
//!     &scheduler,
//! )?;
//! # Ok::<(), wirepipe::Error>(())
//! ```

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::bridge::ChannelSink;
use crate::charset::{Charset, DecodingReader};
use crate::chars::CharWrite;
use crate::copy::{copy_bytes, copy_chars};
use crate::transfer::transfer_file;

/// Content that can write itself to a byte sink.
pub trait ByteProducer: Send + 'static {
    fn write_to(self, sink: &mut dyn Write) -> io::Result<()>;
}

/// Content that can write itself to a character sink.
pub trait CharProducer: Send + 'static {
    fn write_to(self, sink: &mut dyn CharWrite) -> io::Result<()>;
}

/// Content that can write itself to a channel sink, typically through a
/// zero-copy transfer.
pub trait ChannelProducer: Send + 'static {
    fn write_to(self, sink: &mut ChannelSink) -> io::Result<()>;
}

impl<F> ByteProducer for F
where
    F: FnOnce(&mut dyn Write) -> io::Result<()> + Send + 'static,
{
    fn write_to(self, sink: &mut dyn Write) -> io::Result<()> {
        self(sink)
    }
}

impl<F> CharProducer for F
where
    F: FnOnce(&mut dyn CharWrite) -> io::Result<()> + Send + 'static,
{
    fn write_to(self, sink: &mut dyn CharWrite) -> io::Result<()> {
        self(sink)
    }
}

impl<F> ChannelProducer for F
where
    F: FnOnce(&mut ChannelSink) -> io::Result<()> + Send + 'static,
{
    fn write_to(self, sink: &mut ChannelSink) -> io::Result<()> {
        self(sink)
    }
}

// ── TextContent ─────────────────────────────────────────────────────

/// In-memory text, encoded with its charset on the byte path.
#[derive(Debug, Clone)]
pub struct TextContent {
    text: String,
    charset: Charset,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            charset: Charset::UTF_8,
        }
    }

    pub fn with_charset(self, charset: Charset) -> Self {
        Self { charset, ..self }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }
}

impl CharProducer for TextContent {
    fn write_to(self, sink: &mut dyn CharWrite) -> io::Result<()> {
        sink.write_str(&self.text)?;
        sink.flush_chars()
    }
}

impl ByteProducer for TextContent {
    fn write_to(self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(&self.charset.encode(&self.text))?;
        sink.flush()
    }
}

// ── FileContent ─────────────────────────────────────────────────────

/// A file on disk. The channel path uses a zero-copy transfer; the
/// character path decodes with the configured charset.
#[derive(Debug, Clone)]
pub struct FileContent {
    path: PathBuf,
    charset: Charset,
}

impl FileContent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            charset: Charset::UTF_8,
        }
    }

    pub fn with_charset(self, charset: Charset) -> Self {
        Self { charset, ..self }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        File::open(&self.path).map_err(|e| {
            io::Error::new(e.kind(), format!("failed to open {}: {e}", self.path.display()))
        })
    }
}

impl ByteProducer for FileContent {
    fn write_to(self, sink: &mut dyn Write) -> io::Result<()> {
        copy_bytes(self.open()?, sink).map(drop)
    }
}

impl CharProducer for FileContent {
    fn write_to(self, sink: &mut dyn CharWrite) -> io::Result<()> {
        let reader = DecodingReader::new(self.open()?, self.charset);
        copy_chars(reader, sink).map(drop)
    }
}

impl ChannelProducer for FileContent {
    fn write_to(self, sink: &mut ChannelSink) -> io::Result<()> {
        let file = self.open()?;
        let sent = transfer_file(&file, sink)?;
        tracing::debug!(path = %self.path.display(), bytes = sent, "file content transferred");
        Ok(())
    }
}
