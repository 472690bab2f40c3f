//! Readiness waiting for non-blocking channels.
//!
//! A [`ReadinessWaiter`] owns an OS selector (`epoll`/`kqueue` via `mio`) and
//! parks the calling thread inside the selector until a channel reports the
//! requested [`Interest`]. The channel is registered for the duration of one
//! wait and deregistered afterwards, so the waiter is safe to call repeatedly
//! in a retry loop.
//!
//! At most one waiter per (channel, interest) pair may be active; a second
//! concurrent waiter fails fast with [`Error::AlreadyWaiting`].

use std::fmt;
use std::io;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Poll, Token};

use crate::channel::{RawChannel, SelectableChannel};
use crate::error::{Error, Result};

const CHANNEL: Token = Token(0);

/// The kind of readiness to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    pub(crate) fn index(self) -> usize {
        match self {
            Interest::Readable => 0,
            Interest::Writable => 1,
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::Readable => write!(f, "readable"),
            Interest::Writable => write!(f, "writable"),
        }
    }
}

impl From<Interest> for mio::Interest {
    fn from(interest: Interest) -> Self {
        match interest {
            Interest::Readable => mio::Interest::READABLE,
            Interest::Writable => mio::Interest::WRITABLE,
        }
    }
}

/// Blocks the calling thread until a channel is ready, without polling.
pub struct ReadinessWaiter {
    poll: Poll,
    events: Events,
    timeout: Option<Duration>,
}

impl fmt::Debug for ReadinessWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessWaiter")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReadinessWaiter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(4),
            timeout: None,
        })
    }

    /// Give up with [`Error::TimedOut`] after `timeout` per wait.
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Block until `channel` is ready for `interest`.
    ///
    /// Fails with [`Error::ChannelClosed`] when the peer hung up or the
    /// channel reports an error without becoming ready, and with
    /// [`Error::NotSelectable`] when the descriptor cannot be registered
    /// (regular files, for instance).
    pub fn wait<C: RawChannel>(
        &mut self,
        channel: &SelectableChannel<C>,
        interest: Interest,
    ) -> Result<()> {
        let _slot = channel.claim_waiter(interest)?;

        let fd = channel.get_ref().as_raw_fd();
        let mut source = SourceFd(&fd);
        self.poll
            .registry()
            .register(&mut source, CHANNEL, interest.into())
            .map_err(Error::NotSelectable)?;

        let outcome = self.select(interest);

        if let Err(e) = self.poll.registry().deregister(&mut source) {
            tracing::debug!(error = %e, fd, "failed to deregister channel after readiness wait");
        }
        outcome
    }

    fn select(&mut self, interest: Interest) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::TimedOut(self.timeout.unwrap_or_default()));
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match self.poll.poll(&mut self.events, remaining) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in self.events.iter() {
                if event.token() != CHANNEL {
                    continue;
                }
                let (ready, closed) = match interest {
                    Interest::Readable => (event.is_readable(), event.is_read_closed()),
                    Interest::Writable => (event.is_writable(), event.is_write_closed()),
                };
                if ready {
                    return Ok(());
                }
                if closed || event.is_error() {
                    return Err(Error::ChannelClosed(interest));
                }
            }
            // Spurious wake-up or timeout slice elapsed: re-check.
        }
    }
}

/// One-off wait using a freshly created selector.
pub fn wait_until_ready<C: RawChannel>(
    channel: &SelectableChannel<C>,
    interest: Interest,
) -> Result<()> {
    ReadinessWaiter::new()?.wait(channel, interest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::thread;

    fn nonblocking_pair() -> (SelectableChannel<UnixStream>, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        (SelectableChannel::non_blocking(a).unwrap(), b)
    }

    #[test]
    fn fresh_socket_is_writable() {
        let (channel, _peer) = nonblocking_pair();
        wait_until_ready(&channel, Interest::Writable).unwrap();
    }

    #[test]
    fn readable_after_peer_writes() {
        let (channel, mut peer) = nonblocking_pair();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            peer.write_all(b"ping").unwrap();
            peer
        });

        wait_until_ready(&channel, Interest::Readable).unwrap();
        let mut buf = [0u8; 4];
        let mut stream = channel.get_ref();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        writer.join().unwrap();
    }

    #[test]
    fn readable_wait_times_out() {
        let (channel, _peer) = nonblocking_pair();
        let mut waiter = ReadinessWaiter::new()
            .unwrap()
            .with_timeout(Some(Duration::from_millis(30)));
        let err = waiter.wait(&channel, Interest::Readable).unwrap_err();
        assert!(matches!(err, Error::TimedOut(_)));
    }

    #[test]
    fn repeated_waits_on_same_waiter() {
        let (channel, mut peer) = nonblocking_pair();
        let mut waiter = ReadinessWaiter::new().unwrap();
        for _ in 0..3 {
            waiter.wait(&channel, Interest::Writable).unwrap();
        }
        peer.write_all(b"x").unwrap();
        waiter.wait(&channel, Interest::Readable).unwrap();
    }

    #[test]
    fn duplicate_waiter_fails_fast() {
        let (channel, peer) = nonblocking_pair();
        let channel = Arc::new(channel);

        let blocked = Arc::clone(&channel);
        let first = thread::spawn(move || wait_until_ready(&blocked, Interest::Readable));
        thread::sleep(Duration::from_millis(30));

        let err = wait_until_ready(&channel, Interest::Readable).unwrap_err();
        assert!(matches!(err, Error::AlreadyWaiting(Interest::Readable)));

        drop(peer);
        // Peer hang-up with nothing buffered: either readable (EOF) or closed.
        let outcome = first.join().unwrap();
        assert!(matches!(outcome, Ok(()) | Err(Error::ChannelClosed(Interest::Readable))));
    }

    #[test]
    fn hung_up_pipe_is_channel_closed() {
        let (sender, receiver) = mio::unix::pipe::new().unwrap();
        let channel = SelectableChannel::non_blocking(receiver).unwrap();
        drop(sender);

        let err = wait_until_ready(&channel, Interest::Readable).unwrap_err();
        assert!(matches!(err, Error::ChannelClosed(Interest::Readable)));
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn regular_file_is_not_selectable() {
        let file = tempfile::tempfile().unwrap();
        let channel = SelectableChannel::blocking(file).unwrap();
        let err = wait_until_ready(&channel, Interest::Readable).unwrap_err();
        assert!(matches!(err, Error::NotSelectable(_)));
    }
}
