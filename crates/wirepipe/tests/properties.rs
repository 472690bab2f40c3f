//! End-to-end behavior of pipes, bridging and bulk copy.
//!
//! - Order preservation and backpressure through a bounded pipe
//! - End-of-stream terminality
//! - Truncation (not an error) on producer failure, reported exactly once
//! - Broken-pipe propagation when the consumer walks away
//! - Copy fidelity, zero-copy transfer across partial calls, draining

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wirepipe::{
    copy_bytes, exhaust, pipe, transfer_file, Bridge, Drained, Error, FailureReporter, FileContent,
    IoConfig, Severity, ThreadPerTask, TransferSource,
};

#[derive(Default)]
struct CountingReporter {
    reports: AtomicUsize,
    messages: Mutex<Vec<String>>,
}

impl FailureReporter for CountingReporter {
    fn report(&self, _: Severity, message: &str, cause: &(dyn std::error::Error + 'static)) {
        self.reports.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(format!("{message}: {cause}"));
    }
}

// ── Order preservation ──────────────────────────────────────────────

#[test]
fn pipe_preserves_write_order_across_threads() {
    let (mut sink, mut source) = pipe::<u8>(64);
    let writes: Vec<Vec<u8>> = (0..500u32)
        .map(|i| i.to_le_bytes().repeat(1 + (i as usize % 13)))
        .collect();
    let expected: Vec<u8> = writes.concat();

    let producer = thread::spawn(move || {
        for w in &writes {
            sink.write_all(w).unwrap();
        }
    });

    let mut out = Vec::new();
    source.read_to_end(&mut out).unwrap();
    producer.join().unwrap();
    assert_eq!(out, expected);
}

// ── Backpressure ────────────────────────────────────────────────────

#[test]
fn full_pipe_blocks_producer_until_reader_drains() {
    let capacity = 32;
    let (mut sink, mut source) = pipe::<u8>(capacity);
    let finished = Arc::new(AtomicBool::new(false));

    let done = Arc::clone(&finished);
    let producer = thread::spawn(move || {
        sink.write_all(&[9u8; 100]).unwrap();
        done.store(true, Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!finished.load(Ordering::SeqCst), "producer must be blocked on a full pipe");
    assert_eq!(source.available(), capacity);

    let mut out = Vec::new();
    source.read_to_end(&mut out).unwrap();
    producer.join().unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(out.len(), 100);
}

// ── End-of-stream terminality ───────────────────────────────────────

#[test]
fn reads_after_end_return_remainder_then_end_forever() {
    let (mut sink, mut source) = pipe::<u8>(16);
    sink.write_all(b"rest").unwrap();
    sink.signal_end();
    sink.signal_end();

    let mut buf = [0u8; 16];
    assert_eq!(source.read(&mut buf).unwrap(), 4);
    for _ in 0..5 {
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }
    assert!(sink.write(b"more").is_err());
}

// ── Truncation on producer failure ──────────────────────────────────

#[test]
fn failing_producer_truncates_stream_and_reports_once() {
    let scheduler = ThreadPerTask::new();
    let reporter = Arc::new(CountingReporter::default());
    let bridge = Bridge::new(&scheduler)
        .with_config(IoConfig::default().with_pipe_capacity(8))
        .with_reporter(reporter.clone());

    let k = 1000;
    let mut source = bridge
        .byte_source(move |sink: &mut dyn Write| -> io::Result<()> {
            sink.write_all(&vec![b'k'; k])?;
            Err(io::Error::new(io::ErrorKind::InvalidData, "source corrupted"))
        })
        .unwrap();
    let completion = source.completion().unwrap();

    let mut out = Vec::new();
    source.read_to_end(&mut out).expect("reader must not see the producer error");
    assert_eq!(out.len(), k);

    assert!(matches!(completion.wait_blocking(), Err(Error::ProducerFailure(_))));
    assert_eq!(reporter.reports.load(Ordering::SeqCst), 1);
    assert!(reporter.messages.lock().unwrap()[0].contains("source corrupted"));
}

// ── Broken-pipe propagation ─────────────────────────────────────────

#[test]
fn closing_consumer_before_reading_breaks_producer() {
    let scheduler = ThreadPerTask::new();
    let reporter = Arc::new(CountingReporter::default());
    let bridge = Bridge::new(&scheduler)
        .with_config(IoConfig::default().with_pipe_capacity(4))
        .with_reporter(reporter.clone());
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    let mut source = bridge
        .byte_source(move |sink: &mut dyn Write| -> io::Result<()> {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                sink.write_all(b"data")?;
            }
        })
        .unwrap();
    let completion = source.completion().unwrap();
    drop(source);

    match completion.wait_blocking() {
        Err(Error::ProducerFailure(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected broken pipe, got {other:?}"),
    }
    assert!(attempts.load(Ordering::SeqCst) <= 3);
    assert_eq!(reporter.reports.load(Ordering::SeqCst), 1);
}

// ── Bulk copy fidelity ──────────────────────────────────────────────

#[test]
fn copy_bytes_moves_every_byte_and_leaves_destination_open() {
    let data: Vec<u8> = (0..70_001u32).map(|i| (i ^ (i >> 8)) as u8).collect();
    let mut src = tempfile::tempfile().unwrap();
    src.write_all(&data).unwrap();
    src.seek(SeekFrom::Start(0)).unwrap();

    let mut dst = tempfile::tempfile().unwrap();
    assert_eq!(copy_bytes(src, &mut dst).unwrap(), data.len() as u64);

    // Destination is still usable.
    dst.write_all(b"!").unwrap();
    dst.seek(SeekFrom::Start(0)).unwrap();
    let mut out = Vec::new();
    dst.read_to_end(&mut out).unwrap();
    assert_eq!(&out[..data.len()], &data[..]);
    assert_eq!(out.last(), Some(&b'!'));
}

// ── Zero-copy fast path ─────────────────────────────────────────────

struct Stingy {
    file: File,
    calls: AtomicUsize,
}

impl TransferSource for Stingy {
    fn size(&self) -> io::Result<u64> {
        self.file.size()
    }

    fn transfer_to(&self, position: u64, count: u64, target: RawFd) -> io::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.file.transfer_to(position, count.min(777), target)
    }
}

#[test]
fn zero_copy_transfer_completes_over_partial_calls() {
    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 97) as u8).collect();
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&data).unwrap();
    let src = Stingy {
        file,
        calls: AtomicUsize::new(0),
    };

    let mut dst = tempfile::tempfile().unwrap();
    assert_eq!(transfer_file(&src, &mut dst).unwrap(), data.len() as u64);
    assert!(src.calls.load(Ordering::SeqCst) > 1);

    dst.seek(SeekFrom::Start(0)).unwrap();
    let mut out = Vec::new();
    dst.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn file_content_streams_through_channel_bridge() {
    let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();

    let scheduler = ThreadPerTask::new();
    let mut source = Bridge::new(&scheduler)
        .channel_source(FileContent::new(file.path()))
        .unwrap();
    let completion = source.completion().unwrap();

    let mut out = Vec::new();
    source.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    completion.wait_blocking().unwrap();
}

// ── Draining ────────────────────────────────────────────────────────

#[test]
fn drain_of_absent_source_is_a_sentinel() {
    assert_eq!(exhaust(None::<File>).unwrap(), Drained::Absent);
    assert_ne!(exhaust(Some(io::empty())).unwrap(), Drained::Absent);
    assert_eq!(exhaust(Some(io::empty())).unwrap(), Drained::Consumed(0));
}
