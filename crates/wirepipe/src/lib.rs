//! wirepipe — push-to-pull stream bridging for blocking I/O.
//!
//! Producers that know how to *write* their content (an in-memory string, a
//! file, a closure) are turned into sources a consumer can *read*, with
//! bounded memory and without ever blocking a reader forever:
//!
//! - **Pipes**: bounded single-producer/single-consumer byte and character
//!   pipes with out-of-band end-of-stream and broken-pipe detection
//! - **Readiness waiting**: park a thread on a selector until a
//!   non-blocking channel is readable or writable
//! - **Channel adapters**: blocking `Read` / `Write` over channels whose
//!   mode may change concurrently
//! - **Bridging**: run a producer on a caller-supplied [`Scheduler`] and
//!   hand back the read end, with failures routed to a [`FailureReporter`]
//! - **Bulk copy**: buffered byte/char/channel copies, draining, and
//!   zero-copy file transfer
//!
//! # Architecture
//!
//! ```text
//! Bridge (scheduler, IoConfig, reporter)
//!   ├── byte_source    → pipe<u8>   ← ByteProducer
//!   ├── char_source    → pipe<char> ← CharProducer
//!   └── channel_source → OS pipe    ← ChannelProducer
//!                          │
//!                          └── NbChannelReader / NbChannelWriter
//!                                └── ReadinessWaiter (mio)
//! ```

pub mod bridge;
pub mod channel;
pub mod chars;
pub mod charset;
pub mod config;
pub mod copy;
mod error;
pub mod pipe;
pub mod producer;
pub mod readiness;
pub mod report;
pub mod scheduler;
pub mod transfer;

pub use bridge::{
    bridge_to_byte_source, bridge_to_channel_source, bridge_to_char_source, Bridge, Bridged,
    ChannelSink, ChannelSource, Completion, Outcome,
};
pub use channel::{
    adapt_channel_to_byte_sink, adapt_channel_to_byte_source, NbChannelReader, NbChannelWriter,
    RawChannel, ReadableChannel, SelectableChannel, WritableChannel,
};
pub use chars::{CharRead, CharWrite};
pub use charset::{reader_for, stream_for, Charset, DecodingReader, DecodingWriter, EncodingReader};
pub use config::IoConfig;
pub use copy::{copy_bytes, copy_channels, copy_chars, exhaust, Drained};
pub use error::{Error, Result};
pub use pipe::{pipe, pipe_with_timeout, PipeSink, PipeSource, DEFAULT_PIPE_CAPACITY};
pub use producer::{ByteProducer, ChannelProducer, CharProducer, FileContent, TextContent};
pub use readiness::{wait_until_ready, Interest, ReadinessWaiter};
pub use report::{FailureReporter, Severity, TracingReporter};
pub use scheduler::{Scheduler, Task, ThreadPerTask};
pub use transfer::{transfer_file, TransferSource, TransferTarget};
