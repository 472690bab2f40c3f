//! Byte ↔ character adapters.
//!
//! Charset names are resolved once, when an adapter is built; an unknown
//! label fails right there with [`Error::EncodingFailure`] instead of on
//! the first read.
//!
//! Labels follow the WHATWG Encoding Standard (`encoding_rs`): `latin1` and
//! `iso-8859-1` resolve to `windows-1252`, and UTF-16 encodings decode but
//! encode as UTF-8. Unmappable characters are encoded as numeric character
//! references.

use std::fmt;
use std::io::{self, Read, Write};

use encoding_rs::{CoderResult, Decoder, Encoder, Encoding};

use crate::chars::{CharRead, CharWrite};
use crate::error::{Error, Result};

/// Bytes pulled from the underlying stream per decode step.
const DECODE_CHUNK: usize = 4096;
/// Characters pulled from the underlying reader per encode step.
const ENCODE_CHUNK: usize = 2048;

/// A resolved character set.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    pub const UTF_8: Charset = Charset(encoding_rs::UTF_8);

    /// Resolve a charset label such as `"UTF-8"` or `"windows-1252"`.
    pub fn for_name(name: &str) -> Result<Self> {
        Encoding::for_label(name.trim().as_bytes())
            .map(Charset)
            .ok_or_else(|| Error::EncodingFailure(name.to_string()))
    }

    /// Canonical name of the charset.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Decode a complete byte slice. Malformed sequences become U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        self.0.decode_without_bom_handling(bytes).0.into_owned()
    }

    /// Encode a complete string.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        self.0.encode(text).0.into_owned()
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::UTF_8
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode `src` into `dst`, growing `dst` until all input is consumed.
fn decode_into(decoder: &mut Decoder, mut src: &[u8], dst: &mut String, last: bool) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16);
        dst.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(src, dst, last);
        src = &src[read..];
        if let CoderResult::InputEmpty = result {
            return;
        }
    }
}

/// Encode `src` into `dst`, growing `dst` until all input is consumed.
fn encode_into(encoder: &mut Encoder, mut src: &str, dst: &mut Vec<u8>, last: bool) {
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_if_no_unmappables(src.len())
            .unwrap_or(src.len() * 4 + 16)
            .max(16);
        dst.reserve(needed);
        let (result, read, _) = encoder.encode_from_utf8_to_vec(src, dst, last);
        src = &src[read..];
        if let CoderResult::InputEmpty = result {
            return;
        }
    }
}

// ── DecodingReader ──────────────────────────────────────────────────

/// Character source decoding an underlying byte stream.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    bytes: Vec<u8>,
    decoded: String,
    /// Byte offset of the next unread char in `decoded`.
    offset: usize,
    eof: bool,
}

/// Build a character source over `stream` decoding with `charset_name`.
pub fn reader_for<R: Read>(stream: R, charset_name: &str) -> Result<DecodingReader<R>> {
    Ok(DecodingReader::new(stream, Charset::for_name(charset_name)?))
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, charset: Charset) -> Self {
        Self {
            inner,
            decoder: charset.0.new_decoder_without_bom_handling(),
            bytes: vec![0; DECODE_CHUNK],
            decoded: String::new(),
            offset: 0,
            eof: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Refill `decoded` with at least one char unless the stream ended.
    fn fill(&mut self) -> io::Result<()> {
        while self.offset >= self.decoded.len() && !self.eof {
            self.decoded.clear();
            self.offset = 0;
            let n = match self.inner.read(&mut self.bytes) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.eof = true;
            }
            decode_into(&mut self.decoder, &self.bytes[..n], &mut self.decoded, n == 0);
        }
        Ok(())
    }
}

impl<R: Read> CharRead for DecodingReader<R> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill()?;
        let mut n = 0;
        for (slot, c) in buf.iter_mut().zip(self.decoded[self.offset..].chars()) {
            *slot = c;
            n += 1;
            self.offset += c.len_utf8();
        }
        Ok(n)
    }
}

// ── EncodingReader ──────────────────────────────────────────────────

/// Byte source encoding an underlying character source.
pub struct EncodingReader<C> {
    inner: C,
    encoder: Encoder,
    chars: Vec<char>,
    staged: String,
    encoded: Vec<u8>,
    offset: usize,
    eof: bool,
}

/// Build a byte stream over `chars` encoding with `charset_name`.
pub fn stream_for<C: CharRead>(chars: C, charset_name: &str) -> Result<EncodingReader<C>> {
    Ok(EncodingReader::new(chars, Charset::for_name(charset_name)?))
}

impl<C: CharRead> EncodingReader<C> {
    pub fn new(inner: C, charset: Charset) -> Self {
        Self {
            inner,
            encoder: charset.0.new_encoder(),
            chars: vec!['\0'; ENCODE_CHUNK],
            staged: String::new(),
            encoded: Vec::new(),
            offset: 0,
            eof: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        while self.offset >= self.encoded.len() && !self.eof {
            self.encoded.clear();
            self.offset = 0;
            let n = match self.inner.read_chars(&mut self.chars) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.eof = true;
            }
            self.staged.clear();
            self.staged.extend(&self.chars[..n]);
            encode_into(&mut self.encoder, &self.staged, &mut self.encoded, n == 0);
        }
        Ok(())
    }
}

impl<C: CharRead> Read for EncodingReader<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill()?;
        let pending = &self.encoded[self.offset..];
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        self.offset += n;
        Ok(n)
    }
}

// ── DecodingWriter ──────────────────────────────────────────────────

/// Byte sink decoding everything written into a character sink.
///
/// Multi-byte sequences split across writes are carried over by the
/// decoder. Call [`finish`](Self::finish) to flush a trailing partial
/// sequence (as U+FFFD).
pub struct DecodingWriter<W> {
    inner: W,
    decoder: Decoder,
    decoded: String,
}

impl<W: CharWrite> DecodingWriter<W> {
    pub fn new(inner: W, charset: Charset) -> Self {
        Self {
            inner,
            decoder: charset.0.new_decoder_without_bom_handling(),
            decoded: String::new(),
        }
    }

    /// Flush the decoder and return the character sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.decoded.clear();
        decode_into(&mut self.decoder, &[], &mut self.decoded, true);
        self.inner.write_str(&self.decoded)?;
        self.inner.flush_chars()?;
        Ok(self.inner)
    }
}

impl<W: CharWrite> Write for DecodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.decoded.clear();
        decode_into(&mut self.decoder, buf, &mut self.decoded, false);
        self.inner.write_str(&self.decoded)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush_chars()
    }
}

/// Read a whole byte stream into a string.
pub fn read_to_string<R: Read>(stream: R, charset: Charset) -> io::Result<String> {
    let mut out = String::new();
    DecodingReader::new(stream, charset).read_to_string(&mut out)?;
    Ok(out)
}
