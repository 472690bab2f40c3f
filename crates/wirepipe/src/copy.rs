//! Buffered bulk copy and source draining.
//!
//! Copies run until the source reports end of stream. The source is taken
//! by value and dropped on return, on success and on error alike; the
//! destination is only borrowed and stays open for the caller.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::channel::{
    adapt_channel_to_byte_sink, adapt_channel_to_byte_source, ReadableChannel, SelectableChannel,
    WritableChannel,
};
use crate::chars::{CharRead, CharWrite};

/// Chunk size for byte copies.
pub const BYTE_CHUNK: usize = 4096;
/// Chunk size for character copies.
pub const CHAR_CHUNK: usize = 2048;

/// Copy every byte from `src` to `dst`. Returns the number of bytes copied.
pub fn copy_bytes<R, W>(mut src: R, dst: &mut W) -> io::Result<u64>
where
    R: Read,
    W: Write + ?Sized,
{
    let mut buf = [0u8; BYTE_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
    dst.flush()?;
    tracing::trace!(bytes = total, "byte copy complete");
    Ok(total)
}

/// Copy every character from `src` to `dst`. Returns the number of
/// characters copied.
pub fn copy_chars<R, W>(mut src: R, dst: &mut W) -> io::Result<u64>
where
    R: CharRead,
    W: CharWrite + ?Sized,
{
    let mut buf = ['\0'; CHAR_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match src.read_chars(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst.write_all_chars(&buf[..n])?;
        total += n as u64;
    }
    dst.flush_chars()?;
    tracing::trace!(chars = total, "char copy complete");
    Ok(total)
}

/// Copy between two channels in either mode. Non-blocking channels are
/// driven through the readiness-waiting adapters.
pub fn copy_channels<C, D>(
    src: Arc<SelectableChannel<C>>,
    dst: Arc<SelectableChannel<D>>,
) -> io::Result<u64>
where
    C: ReadableChannel,
    D: WritableChannel,
{
    let mut sink = adapt_channel_to_byte_sink(dst);
    copy_bytes(adapt_channel_to_byte_source(src), &mut sink)
}

/// Result of [`exhaust`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    /// No source was given.
    Absent,
    /// The source was read to end; holds the number of bytes discarded.
    Consumed(u64),
}

impl Drained {
    /// Bytes discarded, zero for [`Drained::Absent`].
    pub fn bytes(self) -> u64 {
        match self {
            Drained::Absent => 0,
            Drained::Consumed(n) => n,
        }
    }
}

/// Read an optional source to its end, discarding the data. The source is
/// closed afterwards.
pub fn exhaust<R: Read>(src: Option<R>) -> io::Result<Drained> {
    match src {
        None => Ok(Drained::Absent),
        Some(src) => copy_bytes(src, &mut io::sink()).map(Drained::Consumed),
    }
}
