//! Zero-copy file transfer.
//!
//! A single kernel transfer call may move fewer bytes than requested, so
//! [`transfer_file`] keeps calling it with an advancing position until the
//! whole file has been sent. When the target is a non-blocking channel that
//! cannot take more bytes, the loop waits for writability instead of
//! spinning.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use crate::channel::{NbChannelWriter, WritableChannel};

/// Largest count handed to one kernel call (Linux caps `sendfile` here).
const MAX_TRANSFER: u64 = 0x7fff_f000;

/// A positional source that can push bytes straight into a descriptor.
pub trait TransferSource {
    /// Total size in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Transfer up to `count` bytes starting at `position` into `target`.
    /// Returns the number actually transferred, possibly fewer than
    /// requested; zero when the target cannot accept more right now.
    fn transfer_to(&self, position: u64, count: u64, target: RawFd) -> io::Result<u64>;
}

impl TransferSource for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    #[cfg(target_os = "linux")]
    fn transfer_to(&self, position: u64, count: u64, target: RawFd) -> io::Result<u64> {
        let mut offset = libc::off_t::try_from(position)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "position out of range"))?;
        let count = count.min(MAX_TRANSFER) as usize;
        loop {
            // SAFETY: both descriptors are owned by live objects for the
            // duration of the call, and `offset` is a valid local.
            let sent = unsafe { libc::sendfile(target, self.as_raw_fd(), &mut offset, count) };
            if sent >= 0 {
                return Ok(sent as u64);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(0),
                _ => return Err(err),
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn transfer_to(&self, position: u64, count: u64, target: RawFd) -> io::Result<u64> {
        use std::io::Write;
        use std::os::fd::BorrowedFd;
        use std::os::unix::fs::FileExt;

        let mut buf = vec![0u8; count.min(64 * 1024) as usize];
        let n = self.read_at(&mut buf, position)?;
        if n == 0 {
            return Ok(0);
        }
        // SAFETY: the caller keeps `target` open for the duration of the call.
        let fd = unsafe { BorrowedFd::borrow_raw(target) };
        let mut out = File::from(fd.try_clone_to_owned()?);
        match out.write(&buf[..n]) {
            Ok(written) => Ok(written as u64),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// A descriptor-backed destination for [`transfer_file`].
pub trait TransferTarget: AsRawFd {
    /// Whether a zero-byte transfer may just mean "try again later".
    fn is_non_blocking(&self) -> bool {
        false
    }

    /// Block until the target accepts more bytes.
    fn await_writable(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TransferTarget for File {}

impl<C: WritableChannel> TransferTarget for NbChannelWriter<C> {
    fn is_non_blocking(&self) -> bool {
        !self.channel().is_blocking()
    }

    fn await_writable(&mut self) -> io::Result<()> {
        self.wait_writable()
    }
}

/// Transfer the whole of `src` into `dst`. Returns the byte count, which
/// equals the source size on success.
///
/// A zero-progress transfer into a non-blocking target waits for
/// writability and retries for as long as the source still holds bytes
/// past the current position. It fails with `UnexpectedEof` when the
/// source shrank underneath the transfer, or at once on a blocking target.
pub fn transfer_file<S, D>(src: &S, dst: &mut D) -> io::Result<u64>
where
    S: TransferSource + ?Sized,
    D: TransferTarget + ?Sized,
{
    let size = src.size()?;
    let mut position = 0u64;
    while position < size {
        let sent = src.transfer_to(position, size - position, dst.as_raw_fd())?;
        if sent > 0 {
            position += sent;
            continue;
        }
        if !dst.is_non_blocking() || src.size()? <= position {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("transfer stalled at byte {position} of {size}"),
            ));
        }
        dst.await_writable()?;
    }
    tracing::trace!(bytes = position, "zero-copy transfer complete");
    Ok(position)
}
