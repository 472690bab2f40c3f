//! Push-to-pull bridging.
//!
//! Turns a producer that wants to *write* its content into a source the
//! caller can *read*, by running the producer on a scheduler against the
//! write end of a pipe.
//!
//! # Architecture
//!
//! ```text
//! caller                         scheduler worker
//! ──────                         ────────────────
//! bridge.byte_source(p) ──┐
//!                         ├── pipe(capacity) ──► sink ─► p.write_to(sink)
//!   Bridged<PipeSource> ◄─┘                              │
//!     .read()  ◄────────── bytes ◄────────────────────────┤
//!     .read() == 0  ◄───── end of stream (sink dropped) ◄─┤
//!   Completion ◄────────── outcome ◄──────────────────────┘
//!                          failure ─► FailureReporter (once)
//! ```
//!
//! The sink is always dropped before the outcome is published, so the
//! reader never blocks forever, even when the producer fails or panics.
//! A failed producer leaves the reader with a truncated stream; the cause
//! goes to the [`FailureReporter`] and to the [`Completion`].
//!
//! Do not run the consumer of a bridged source on the same bounded
//! scheduler as its producer: with every worker busy reading, the producer
//! never gets to run.

use std::any::Any;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use mio::unix::pipe::{Receiver, Sender};
use tokio::sync::oneshot;

use crate::channel::{NbChannelReader, NbChannelWriter, SelectableChannel};
use crate::chars::CharRead;
use crate::config::IoConfig;
use crate::error::{Error, Result};
use crate::pipe::{pipe_with_timeout, PipeSink, PipeSource};
use crate::producer::{ByteProducer, ChannelProducer, CharProducer};
use crate::report::{FailureReporter, Severity, TracingReporter};
use crate::scheduler::Scheduler;

/// Write end handed to [`ChannelProducer`]s.
pub type ChannelSink = NbChannelWriter<Sender>;
/// Read end returned by channel bridging. Selectable.
pub type ChannelSource = NbChannelReader<Receiver>;

/// Outcome of a producer run.
pub type Outcome = Result<()>;

/// Builds bridged sources against one scheduler.
pub struct Bridge<'a> {
    scheduler: &'a dyn Scheduler,
    config: IoConfig,
    reporter: Arc<dyn FailureReporter>,
}

impl<'a> Bridge<'a> {
    pub fn new(scheduler: &'a dyn Scheduler) -> Self {
        Self {
            scheduler,
            config: IoConfig::default(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_config(self, config: IoConfig) -> Self {
        Self { config, ..self }
    }

    pub fn with_reporter(self, reporter: Arc<dyn FailureReporter>) -> Self {
        Self { reporter, ..self }
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    /// Bridge a byte producer into a byte source.
    pub fn byte_source<P: ByteProducer>(&self, producer: P) -> Result<Bridged<PipeSource<u8>>> {
        let (sink, source) = pipe_with_timeout(self.config.pipe_capacity, self.config.timeout());
        let completion = self.spawn_copy("byte", sink, move |sink: &mut PipeSink<u8>| {
            ByteProducer::write_to(producer, sink)
        })?;
        Ok(Bridged::new(source, completion))
    }

    /// Bridge a character producer into a character source.
    pub fn char_source<P: CharProducer>(&self, producer: P) -> Result<Bridged<PipeSource<char>>> {
        let (sink, source) = pipe_with_timeout(self.config.pipe_capacity, self.config.timeout());
        let completion = self.spawn_copy("char", sink, move |sink: &mut PipeSink<char>| {
            CharProducer::write_to(producer, sink)
        })?;
        Ok(Bridged::new(source, completion))
    }

    /// Bridge a channel producer into a selectable channel source backed by
    /// an OS pipe. The source starts in non-blocking mode; its reads still
    /// block by waiting for readiness.
    pub fn channel_source<P: ChannelProducer>(&self, producer: P) -> Result<Bridged<ChannelSource>> {
        let (sender, receiver) = mio::unix::pipe::new()?;
        let timeout = self.config.timeout();
        let sink = NbChannelWriter::new(Arc::new(SelectableChannel::non_blocking(sender)?))
            .with_timeout(timeout);
        let source = NbChannelReader::new(Arc::new(SelectableChannel::non_blocking(receiver)?))
            .with_timeout(timeout);
        let completion = self.spawn_copy("channel", sink, move |sink: &mut ChannelSink| {
            ChannelProducer::write_to(producer, sink)
        })?;
        Ok(Bridged::new(source, completion))
    }

    fn spawn_copy<S, F>(&self, kind: &'static str, sink: S, write: F) -> Result<Completion>
    where
        S: Send + 'static,
        F: FnOnce(&mut S) -> io::Result<()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let reporter = Arc::clone(&self.reporter);
        self.scheduler.submit(Box::new(move || {
            let mut sink = sink;
            let result = panic::catch_unwind(AssertUnwindSafe(|| write(&mut sink)));
            drop(sink);

            let result = result.unwrap_or_else(|payload| {
                Err(io::Error::other(format!(
                    "content producer panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
            let outcome = match result {
                Ok(()) => {
                    tracing::debug!(kind, "content producer finished");
                    Ok(())
                }
                Err(e) => {
                    let severity = if e.kind() == io::ErrorKind::BrokenPipe {
                        Severity::Debug
                    } else {
                        Severity::Warn
                    };
                    reporter.report(
                        severity,
                        &format!("{kind} producer failed; reader sees a truncated stream"),
                        &e,
                    );
                    Err(Error::ProducerFailure(e))
                }
            };
            // Nobody listening is fine.
            let _ = tx.send(outcome);
        }))?;
        Ok(Completion { rx })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Bridge `producer` into a byte source with default settings.
pub fn bridge_to_byte_source<P: ByteProducer>(
    producer: P,
    scheduler: &dyn Scheduler,
) -> Result<Bridged<PipeSource<u8>>> {
    Bridge::new(scheduler).byte_source(producer)
}

/// Bridge `producer` into a character source with default settings.
pub fn bridge_to_char_source<P: CharProducer>(
    producer: P,
    scheduler: &dyn Scheduler,
) -> Result<Bridged<PipeSource<char>>> {
    Bridge::new(scheduler).char_source(producer)
}

/// Bridge `producer` into a selectable channel source with default settings.
pub fn bridge_to_channel_source<P: ChannelProducer>(
    producer: P,
    scheduler: &dyn Scheduler,
) -> Result<Bridged<ChannelSource>> {
    Bridge::new(scheduler).channel_source(producer)
}

// ── Bridged ─────────────────────────────────────────────────────────

/// A readable source fed by a producer running elsewhere.
///
/// Dropping it closes the read end; a producer still writing then fails
/// with a broken pipe.
#[derive(Debug)]
pub struct Bridged<R> {
    source: R,
    completion: Option<Completion>,
}

impl<R> Bridged<R> {
    fn new(source: R, completion: Completion) -> Self {
        Self {
            source,
            completion: Some(completion),
        }
    }

    /// Take the producer's completion handle. Returns `None` once taken.
    pub fn completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_parts(self) -> (R, Option<Completion>) {
        (self.source, self.completion)
    }
}

impl<R: Read> Read for Bridged<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl<R: CharRead> CharRead for Bridged<R> {
    fn read_chars(&mut self, buf: &mut [char]) -> io::Result<usize> {
        self.source.read_chars(buf)
    }
}

impl<R: AsRawFd> AsRawFd for Bridged<R> {
    fn as_raw_fd(&self) -> RawFd {
        self.source.as_raw_fd()
    }
}

// ── Completion ──────────────────────────────────────────────────────

/// Resolves to the producer's outcome once the copy task has finished.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    /// Block until the producer finishes. Must not be called from within
    /// an async runtime; use [`wait`](Self::wait) there.
    pub fn wait_blocking(self) -> Outcome {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(abandoned()))
    }

    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or_else(|_| Err(abandoned()))
    }

    /// The outcome, if the producer has finished.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

fn abandoned() -> Error {
    Error::Scheduler("copy task was dropped before it finished".into())
}
