//! Non-blocking channel adapter.
//!
//! Wraps an OS channel whose blocking mode may be toggled concurrently by
//! other code, and presents it as a plain blocking `Read` / `Write` stream.
//!
//! # Architecture
//!
//! ```text
//! NbChannelReader::read(buf)
//!   → lock mode  ─┬─ blocking     → unlock mode → channel.read(buf)
//!                 └─ non-blocking → channel.read(buf) → unlock mode
//!                                     ├─ Ok(n)       → return
//!                                     └─ WouldBlock  → ReadinessWaiter::wait(Readable)
//!                                                      → retry
//! ```
//!
//! A non-blocking attempt runs under the channel's mode-change lock. A
//! blocking attempt runs after the lock is released, so a reader parked on
//! a duplex channel never stalls the writer sharing it. If the mode flips
//! to non-blocking while that call is in flight, its `WouldBlock` is
//! treated like any other: wait for readiness and retry. No `WouldBlock`
//! reaches the caller.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::readiness::{Interest, ReadinessWaiter};

// ── Channel traits ──────────────────────────────────────────────────

/// An OS-level channel that can be switched between blocking and
/// non-blocking mode and registered with a readiness selector.
pub trait RawChannel: AsRawFd + Send + Sync {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

/// A channel bytes can be read from through a shared reference.
pub trait ReadableChannel: RawChannel {
    fn read_channel(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A channel bytes can be written to through a shared reference.
pub trait WritableChannel: RawChannel {
    fn write_channel(&self, buf: &[u8]) -> io::Result<usize>;

    fn flush_channel(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Toggle `O_NONBLOCK` on a raw descriptor.
fn set_fd_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    // SAFETY: fcntl with F_GETFL/F_SETFL only reads and updates descriptor
    // flags; an invalid fd yields EBADF, which is reported below.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    // SAFETY: see above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

macro_rules! duplex_channel {
    ($ty:ty) => {
        impl RawChannel for $ty {
            fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
                <$ty>::set_nonblocking(self, nonblocking)
            }
        }

        impl ReadableChannel for $ty {
            fn read_channel(&self, buf: &mut [u8]) -> io::Result<usize> {
                let mut stream: &$ty = self;
                stream.read(buf)
            }
        }

        impl WritableChannel for $ty {
            fn write_channel(&self, buf: &[u8]) -> io::Result<usize> {
                let mut stream: &$ty = self;
                stream.write(buf)
            }

            fn flush_channel(&self) -> io::Result<()> {
                let mut stream: &$ty = self;
                stream.flush()
            }
        }
    };
}

duplex_channel!(TcpStream);
duplex_channel!(UnixStream);

impl RawChannel for File {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        set_fd_nonblocking(self.as_raw_fd(), nonblocking)
    }
}

impl ReadableChannel for File {
    fn read_channel(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file: &File = self;
        file.read(buf)
    }
}

impl WritableChannel for File {
    fn write_channel(&self, buf: &[u8]) -> io::Result<usize> {
        let mut file: &File = self;
        file.write(buf)
    }

    fn flush_channel(&self) -> io::Result<()> {
        let mut file: &File = self;
        file.flush()
    }
}

impl RawChannel for mio::unix::pipe::Sender {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        mio::unix::pipe::Sender::set_nonblocking(self, nonblocking)
    }
}

impl WritableChannel for mio::unix::pipe::Sender {
    fn write_channel(&self, buf: &[u8]) -> io::Result<usize> {
        let mut sender: &mio::unix::pipe::Sender = self;
        sender.write(buf)
    }
}

impl RawChannel for mio::unix::pipe::Receiver {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        mio::unix::pipe::Receiver::set_nonblocking(self, nonblocking)
    }
}

impl ReadableChannel for mio::unix::pipe::Receiver {
    fn read_channel(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut receiver: &mio::unix::pipe::Receiver = self;
        receiver.read(buf)
    }
}

// ── SelectableChannel ───────────────────────────────────────────────

/// A channel paired with its mode-change lock.
///
/// All mode changes go through [`set_blocking`](Self::set_blocking); the
/// adapters hold the same lock while they check the mode and attempt
/// non-blocking I/O.
#[derive(Debug)]
pub struct SelectableChannel<C> {
    inner: C,
    /// `true` while the channel is in blocking mode.
    blocking: Mutex<bool>,
    /// Active readiness waiters, indexed by [`Interest::index`].
    waiting: [AtomicBool; 2],
}

/// Releases a waiter slot claimed by [`SelectableChannel::claim_waiter`].
pub(crate) struct WaiterSlot<'a> {
    flag: &'a AtomicBool,
}

impl Drop for WaiterSlot<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<C: RawChannel> SelectableChannel<C> {
    /// Wrap `inner`, putting it in the requested mode.
    pub fn new(inner: C, blocking: bool) -> io::Result<Self> {
        inner.set_nonblocking(!blocking)?;
        Ok(Self {
            inner,
            blocking: Mutex::new(blocking),
            waiting: [AtomicBool::new(false), AtomicBool::new(false)],
        })
    }

    pub fn blocking(inner: C) -> io::Result<Self> {
        Self::new(inner, true)
    }

    pub fn non_blocking(inner: C) -> io::Result<Self> {
        Self::new(inner, false)
    }

    /// Switch modes. Waits for any in-flight non-blocking attempt to finish.
    pub fn set_blocking(&self, blocking: bool) -> io::Result<()> {
        let mut mode = self.mode_lock();
        if *mode != blocking {
            self.inner.set_nonblocking(!blocking)?;
            *mode = blocking;
            tracing::trace!(fd = self.inner.as_raw_fd(), blocking, "channel mode changed");
        }
        Ok(())
    }

    pub fn is_blocking(&self) -> bool {
        *self.mode_lock()
    }

    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// The mode-change lock. The guarded value is the blocking flag.
    pub fn mode_lock(&self) -> MutexGuard<'_, bool> {
        self.blocking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn claim_waiter(&self, interest: Interest) -> Result<WaiterSlot<'_>> {
        let flag = &self.waiting[interest.index()];
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyWaiting(interest));
        }
        Ok(WaiterSlot { flag })
    }
}

impl<C: AsRawFd> AsRawFd for SelectableChannel<C> {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

// ── Adapters ────────────────────────────────────────────────────────

/// Outcome of one locked attempt.
enum Attempt {
    Done(io::Result<usize>),
    WouldBlock,
}

/// Shared retry machinery for both adapter directions.
#[derive(Debug)]
struct Retrier<C> {
    channel: Arc<SelectableChannel<C>>,
    waiter: Option<ReadinessWaiter>,
    timeout: Option<Duration>,
}

impl<C: RawChannel> Retrier<C> {
    fn new(channel: Arc<SelectableChannel<C>>) -> Self {
        Self {
            channel,
            waiter: None,
            timeout: None,
        }
    }

    /// Run `op` once. Non-blocking attempts hold the mode lock; blocking
    /// ones release it first so the other direction can proceed.
    fn attempt<F>(&self, op: F) -> Attempt
    where
        F: FnOnce(&C) -> io::Result<usize>,
    {
        let mode = self.channel.mode_lock();
        let result = if *mode {
            drop(mode);
            op(&self.channel.inner)
        } else {
            let result = op(&self.channel.inner);
            drop(mode);
            result
        };
        match result {
            // Also reached when the mode flipped during a blocking call.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Attempt::WouldBlock,
            other => Attempt::Done(other),
        }
    }

    fn wait(&mut self, interest: Interest) -> Result<()> {
        let waiter = match self.waiter.take() {
            Some(waiter) => waiter,
            None => ReadinessWaiter::new()?.with_timeout(self.timeout),
        };
        self.waiter.insert(waiter).wait(&self.channel, interest)
    }
}

/// Blocking `Read` over a possibly non-blocking channel.
#[derive(Debug)]
pub struct NbChannelReader<C> {
    retrier: Retrier<C>,
}

/// Blocking `Write` over a possibly non-blocking channel.
#[derive(Debug)]
pub struct NbChannelWriter<C> {
    retrier: Retrier<C>,
}

/// Expose a channel as a blocking byte source.
pub fn adapt_channel_to_byte_source<C: ReadableChannel>(
    channel: Arc<SelectableChannel<C>>,
) -> NbChannelReader<C> {
    NbChannelReader::new(channel)
}

/// Expose a channel as a blocking byte sink.
pub fn adapt_channel_to_byte_sink<C: WritableChannel>(
    channel: Arc<SelectableChannel<C>>,
) -> NbChannelWriter<C> {
    NbChannelWriter::new(channel)
}

impl<C: ReadableChannel> NbChannelReader<C> {
    pub fn new(channel: Arc<SelectableChannel<C>>) -> Self {
        Self {
            retrier: Retrier::new(channel),
        }
    }

    /// Bound each readiness wait.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.retrier.timeout = timeout;
        self.retrier.waiter = None;
        self
    }

    pub fn channel(&self) -> &Arc<SelectableChannel<C>> {
        &self.retrier.channel
    }
}

impl<C: ReadableChannel> Read for NbChannelReader<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.retrier.attempt(|c| c.read_channel(buf)) {
                Attempt::Done(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Attempt::Done(result) => return result,
                Attempt::WouldBlock => match self.retrier.wait(Interest::Readable) {
                    Ok(()) => continue,
                    // Hang-up: one last attempt yields buffered data or EOF.
                    Err(Error::ChannelClosed(_)) => {
                        return match self.retrier.attempt(|c| c.read_channel(buf)) {
                            Attempt::Done(result) => result,
                            Attempt::WouldBlock => {
                                Err(Error::ChannelClosed(Interest::Readable).into())
                            }
                        };
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }
}

impl<C: WritableChannel> NbChannelWriter<C> {
    pub fn new(channel: Arc<SelectableChannel<C>>) -> Self {
        Self {
            retrier: Retrier::new(channel),
        }
    }

    /// Bound each readiness wait.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.retrier.timeout = timeout;
        self.retrier.waiter = None;
        self
    }

    pub fn channel(&self) -> &Arc<SelectableChannel<C>> {
        &self.retrier.channel
    }

    /// Wait until the channel accepts more bytes. Used by zero-copy
    /// transfers that write around the adapter.
    pub fn wait_writable(&mut self) -> io::Result<()> {
        match self.retrier.wait(Interest::Writable) {
            Ok(()) => Ok(()),
            Err(Error::ChannelClosed(_)) => Err(Error::BrokenPipe.into()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<C: WritableChannel> Write for NbChannelWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.retrier.attempt(|c| c.write_channel(buf)) {
                Attempt::Done(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Attempt::Done(result) => return result,
                Attempt::WouldBlock => self.wait_writable()?,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.retrier.channel.inner.flush_channel()
    }
}

impl<C: AsRawFd> AsRawFd for NbChannelReader<C> {
    fn as_raw_fd(&self) -> RawFd {
        self.retrier.channel.as_raw_fd()
    }
}

impl<C: AsRawFd> AsRawFd for NbChannelWriter<C> {
    fn as_raw_fd(&self) -> RawFd {
        self.retrier.channel.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn socket_pair(blocking: bool) -> (Arc<SelectableChannel<UnixStream>>, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        (Arc::new(SelectableChannel::new(a, blocking).unwrap()), b)
    }

    #[test]
    fn nonblocking_read_waits_instead_of_would_block() {
        let (channel, mut peer) = socket_pair(false);
        let mut reader = adapt_channel_to_byte_source(channel);

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            peer.write_all(b"late data").unwrap();
        });

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"late data");
        writer.join().unwrap();
    }

    #[test]
    fn nonblocking_read_reports_eof_after_hangup() {
        let (channel, mut peer) = socket_pair(false);
        peer.write_all(b"tail").unwrap();
        drop(peer);

        let mut reader = adapt_channel_to_byte_source(channel);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"tail");
    }

    #[test]
    fn blocking_mode_delegates_directly() {
        let (channel, mut peer) = socket_pair(true);
        assert!(channel.is_blocking());
        peer.write_all(b"abc").unwrap();

        let mut reader = adapt_channel_to_byte_source(channel);
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn nonblocking_write_survives_full_socket_buffer() {
        let (channel, mut peer) = socket_pair(false);
        let mut writer = adapt_channel_to_byte_sink(channel);
        let payload: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let reader = thread::spawn(move || {
            let mut out = Vec::new();
            peer.read_to_end(&mut out).unwrap();
            out
        });

        writer.write_all(&payload).unwrap();
        drop(writer);
        assert_eq!(reader.join().unwrap(), expected);
    }

    #[test]
    fn write_to_departed_peer_is_broken_pipe() {
        let (channel, peer) = socket_pair(false);
        drop(peer);
        let mut writer = adapt_channel_to_byte_sink(channel);
        let err = writer.write_all(&[0u8; 1 << 20]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn mode_toggles_concurrently_without_leaking_would_block() {
        let (channel, mut peer) = socket_pair(false);
        let toggler_channel = Arc::clone(&channel);
        let mut reader = adapt_channel_to_byte_source(channel);

        let toggler = thread::spawn(move || {
            for i in 0..200 {
                toggler_channel.set_blocking(i % 2 == 0).unwrap();
            }
            toggler_channel.set_blocking(false).unwrap();
        });
        let writer = thread::spawn(move || {
            for chunk in 0..50u8 {
                peer.write_all(&[chunk; 64]).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        toggler.join().unwrap();
        writer.join().unwrap();
        assert_eq!(out.len(), 50 * 64);
    }

    #[test]
    fn blocking_reader_does_not_stall_writer_on_same_channel() {
        let (channel, mut peer) = socket_pair(true);
        let mut reader = adapt_channel_to_byte_source(Arc::clone(&channel));
        let mut writer = adapt_channel_to_byte_sink(channel);

        let echo = thread::spawn(move || {
            let mut request = [0u8; 4];
            peer.read_exact(&mut request).unwrap();
            peer.write_all(&request).unwrap();
        });

        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let mut reply = [0u8; 4];
            let result = reader.read_exact(&mut reply).map(|()| reply);
            let _ = tx.send(result);
        });
        thread::sleep(Duration::from_millis(30));

        writer.write_all(b"ping").unwrap();
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(&reply, b"ping");
        echo.join().unwrap();
    }

    #[test]
    fn hung_up_pipe_reads_end_of_stream() {
        let (sender, receiver) = mio::unix::pipe::new().unwrap();
        let channel = Arc::new(SelectableChannel::non_blocking(receiver).unwrap());
        drop(sender);

        let mut reader = adapt_channel_to_byte_source(channel);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn full_pipe_with_departed_reader_is_broken_pipe() {
        let (sender, receiver) = mio::unix::pipe::new().unwrap();
        let channel = Arc::new(SelectableChannel::non_blocking(sender).unwrap());
        let mut writer = adapt_channel_to_byte_sink(Arc::clone(&channel));

        // Fill the OS pipe so the next write would block.
        let chunk = [0u8; 4096];
        loop {
            match channel.get_ref().write_channel(&chunk) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("unexpected error while filling pipe: {e}"),
            }
        }
        drop(receiver);

        let err = writer.write(&chunk).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn set_blocking_is_reflected() {
        let (channel, _peer) = socket_pair(true);
        channel.set_blocking(false).unwrap();
        assert!(!channel.is_blocking());
        channel.set_blocking(true).unwrap();
        assert!(channel.is_blocking());
    }
}
