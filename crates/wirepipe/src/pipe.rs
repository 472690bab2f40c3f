//! Bounded in-process pipe with explicit end-of-stream.
//!
//! ```text
//!   PipeSink<T> ──▶ [ring buffer, capacity C] ──▶ PipeSource<T>
//!                   ├── write blocks while full          (backpressure)
//!                   ├── read blocks while empty and not ended
//!                   ├── signal_end() / drop sink         → reads drain, then Ok(0)
//!                   └── drop source                      → writer fails with BrokenPipe
//! ```
//!
//! The unit type is generic: `u8` pipes implement `std::io::{Read, Write}`,
//! `char` pipes implement [`CharRead`] / [`CharWrite`].
//!
//! End of stream is a flag on the shared state, never a value written into
//! the buffer, so every unit value is legal data.
//!
//! Capacity `0` is a rendezvous: a write deposits at most one unit and
//! returns only after the reader has taken it.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::chars::{CharRead, CharWrite};
use crate::error::Error;

/// Default pipe capacity, one bulk-copy buffer.
pub const DEFAULT_PIPE_CAPACITY: usize = 4096;

struct State<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    /// Writer signaled end of stream.
    ended: bool,
    /// Reader went away.
    reader_closed: bool,
}

impl<T> State<T> {
    fn free_slots(&self) -> usize {
        self.capacity.max(1).saturating_sub(self.buffer.len())
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    space_available: Condvar,
    data_available: Condvar,
    timeout: Option<Duration>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }

    /// Wait on `condvar`, failing with `TimedOut` once `deadline` has passed.
    /// Callers re-check their condition after every wake-up.
    fn wait<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, State<T>>,
        deadline: Option<Instant>,
    ) -> io::Result<MutexGuard<'a, State<T>>> {
        match deadline {
            None => Ok(condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    let waited = self.timeout.unwrap_or_default();
                    return Err(Error::TimedOut(waited).into());
                }
                let (guard, _) = condvar
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(guard)
            }
        }
    }
}

/// Writing end of a pipe. Dropping it signals end of stream.
pub struct PipeSink<T> {
    shared: Arc<Shared<T>>,
}

/// Reading end of a pipe. Dropping it breaks the pipe for the writer.
pub struct PipeSource<T> {
    shared: Arc<Shared<T>>,
}

/// Create a pipe holding at most `capacity` units.
pub fn pipe<T: Copy>(capacity: usize) -> (PipeSink<T>, PipeSource<T>) {
    pipe_with_timeout(capacity, None)
}

/// Create a pipe whose blocking reads and writes give up after `timeout`.
pub fn pipe_with_timeout<T: Copy>(
    capacity: usize,
    timeout: Option<Duration>,
) -> (PipeSink<T>, PipeSource<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buffer: VecDeque::with_capacity(capacity.max(1)),
            capacity,
            ended: false,
            reader_closed: false,
        }),
        space_available: Condvar::new(),
        data_available: Condvar::new(),
        timeout,
    });

    (
        PipeSink {
            shared: Arc::clone(&shared),
        },
        PipeSource { shared },
    )
}

impl<T: Copy> PipeSink<T> {
    /// Write a prefix of `units`, blocking until at least one slot is free.
    ///
    /// Returns the number of units accepted. Empty input is a no-op.
    /// Fails with `BrokenPipe` once the reader has gone away.
    pub fn write_units(&mut self, units: &[T]) -> io::Result<usize> {
        if units.is_empty() {
            return Ok(0);
        }

        let deadline = self.shared.deadline();
        let mut state = self.shared.lock();
        loop {
            if state.reader_closed {
                return Err(Error::BrokenPipe.into());
            }
            if state.ended {
                return Err(Error::WriteAfterEnd.into());
            }

            let free = state.free_slots();
            if free > 0 {
                let n = free.min(units.len());
                state.buffer.extend(&units[..n]);
                self.shared.data_available.notify_one();

                if state.capacity == 0 {
                    // Rendezvous: hold until the reader took the unit. The
                    // buffer only empties by a read.
                    while !state.buffer.is_empty() {
                        if state.reader_closed {
                            return Err(Error::BrokenPipe.into());
                        }
                        state = self
                            .shared
                            .wait(&self.shared.space_available, state, deadline)?;
                    }
                }
                return Ok(n);
            }

            state = self
                .shared
                .wait(&self.shared.space_available, state, deadline)?;
        }
    }

    /// Write every unit, blocking as often as needed.
    pub fn write_all_units(&mut self, mut units: &[T]) -> io::Result<()> {
        while !units.is_empty() {
            let n = self.write_units(units)?;
            units = &units[n..];
        }
        Ok(())
    }

    /// Signal end of stream. Idempotent; buffered units stay readable.
    pub fn signal_end(&mut self) {
        let mut state = self.shared.lock();
        if !state.ended {
            state.ended = true;
            tracing::trace!(buffered = state.buffer.len(), "pipe end of stream signaled");
        }
        self.shared.data_available.notify_all();
    }

    /// Signal end of stream and release the sink.
    pub fn close(self) {}

    /// Whether the reader has gone away.
    pub fn is_broken(&self) -> bool {
        self.shared.lock().reader_closed
    }
}

impl<T: Copy> PipeSource<T> {
    /// Read up to `buf.len()` units, blocking until at least one is
    /// available or end of stream is signaled.
    ///
    /// Returns `Ok(0)` at end of stream once the buffer is drained, and on
    /// every later call.
    pub fn read_units(&mut self, buf: &mut [T]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = self.shared.deadline();
        let mut state = self.shared.lock();
        loop {
            if !state.buffer.is_empty() {
                let n = buf.len().min(state.buffer.len());
                for (slot, unit) in buf.iter_mut().zip(state.buffer.drain(..n)) {
                    *slot = unit;
                }
                self.shared.space_available.notify_one();
                return Ok(n);
            }
            if state.ended {
                return Ok(0);
            }
            state = self
                .shared
                .wait(&self.shared.data_available, state, deadline)?;
        }
    }

    /// Abandon the stream. A blocked or future write fails with `BrokenPipe`.
    pub fn close(self) {}

    /// Units buffered and not yet read.
    pub fn available(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    /// Configured capacity (0 for a rendezvous pipe).
    pub fn capacity(&self) -> usize {
        self.shared.lock().capacity
    }

    /// Whether end of stream has been signaled. Buffered units may remain.
    pub fn is_ended(&self) -> bool {
        self.shared.lock().ended
    }
}

impl<T> Drop for PipeSink<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.ended = true;
        self.shared.data_available.notify_all();
    }
}

impl<T> Drop for PipeSource<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.reader_closed = true;
        // Units left behind mark a rendezvous write as undelivered.
        self.shared.space_available.notify_all();
    }
}

impl io::Write for PipeSink<u8> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_units(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for PipeSource<u8> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_units(buf)
    }
}

impl CharWrite for PipeSink<char> {
    fn write_chars(&mut self, chars: &[char]) -> io::Result<usize> {
        self.write_units(chars)
    }
}

impl CharRead for PipeSource<char> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        self.read_units(buf)
    }
}

impl<T> std::fmt::Debug for PipeSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSink").finish_non_exhaustive()
    }
}

impl<T> std::fmt::Debug for PipeSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSource").finish_non_exhaustive()
    }
}
