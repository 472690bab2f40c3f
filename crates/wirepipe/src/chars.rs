//! Character source and sink traits.
//!
//! `std::io` only models byte streams. [`CharRead`] and [`CharWrite`] are the
//! character-unit counterparts used by character pipes, charset adapters and
//! [`CharProducer`](crate::CharProducer)s. The unit is a Unicode scalar
//! value (`char`).

use std::io;

/// Pull-style character source.
pub trait CharRead {
    /// Read up to `buf.len()` characters. Returns `Ok(0)` only at end of
    /// stream (or when `buf` is empty).
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize>;

    /// Read everything until end of stream, appending to `out`.
    /// Returns the number of characters appended.
    fn read_to_string(&mut self, out: &mut String) -> io::Result<usize> {
        let mut buf = ['\0'; 1024];
        let mut total = 0;
        loop {
            match self.read_chars(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    out.extend(&buf[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Push-style character sink.
pub trait CharWrite {
    /// Write some prefix of `chars`, returning how many were accepted.
    fn write_chars(&mut self, chars: &[char]) -> io::Result<usize>;

    fn flush_chars(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_all_chars(&mut self, mut chars: &[char]) -> io::Result<()> {
        while !chars.is_empty() {
            match self.write_chars(chars) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole character buffer",
                    ));
                }
                Ok(n) => chars = &chars[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write a whole string, staging it through a small char buffer.
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        let mut staged = ['\0'; 256];
        let mut len = 0;
        for c in s.chars() {
            staged[len] = c;
            len += 1;
            if len == staged.len() {
                self.write_all_chars(&staged)?;
                len = 0;
            }
        }
        self.write_all_chars(&staged[..len])
    }
}

impl<R: CharRead + ?Sized> CharRead for &mut R {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        (**self).read_chars(buf)
    }
}

impl<R: CharRead + ?Sized> CharRead for Box<R> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        (**self).read_chars(buf)
    }
}

impl<W: CharWrite + ?Sized> CharWrite for &mut W {
    fn write_chars(&mut self, chars: &[char]) -> io::Result<usize> {
        (**self).write_chars(chars)
    }

    fn flush_chars(&mut self) -> io::Result<()> {
        (**self).flush_chars()
    }
}

impl<W: CharWrite + ?Sized> CharWrite for Box<W> {
    fn write_chars(&mut self, chars: &[char]) -> io::Result<usize> {
        (**self).write_chars(chars)
    }

    fn flush_chars(&mut self) -> io::Result<()> {
        (**self).flush_chars()
    }
}

/// Reads the characters of a string slice.
impl CharRead for std::str::Chars<'_> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.next() {
                Some(c) => {
                    *slot = c;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl CharWrite for String {
    fn write_chars(&mut self, chars: &[char]) -> io::Result<usize> {
        self.extend(chars);
        Ok(chars.len())
    }

    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.push_str(s);
        Ok(())
    }
}

impl CharWrite for Vec<char> {
    fn write_chars(&mut self, chars: &[char]) -> io::Result<usize> {
        self.extend_from_slice(chars);
        Ok(chars.len())
    }
}
