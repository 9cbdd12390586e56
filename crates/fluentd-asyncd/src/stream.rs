//! Readable handle over a container's log FIFO.
//!
//! The FIFO is opened non-blocking so the open never waits for a writer.
//! Reads wait for readiness with `poll(2)` in short slices and check the
//! shared closed flag between slices; [`StreamCloser::close`] therefore
//! unblocks a pending read from another thread within one slice.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use thiserror::Error;

/// Milliseconds a single `poll(2)` call may block.
const POLL_SLICE_MS: u16 = 100;

/// Marker carried by the error returned once a stream has been closed.
#[derive(Debug, Error)]
#[error("log stream closed")]
pub struct StreamClosed;

/// Builds the error returned by reads on a closed stream.
pub fn closed_error() -> io::Error {
    io::Error::other(StreamClosed)
}

/// Returns `true` when `error` reports a deliberately closed stream.
#[must_use]
pub fn is_stream_closed(error: &io::Error) -> bool {
    error
        .get_ref()
        .is_some_and(|inner| inner.is::<StreamClosed>())
}

/// Log FIFO opened for reading.
#[derive(Debug)]
pub struct LogStream {
    path: PathBuf,
    file: File,
    closed: Arc<AtomicBool>,
}

impl LogStream {
    /// Opens the FIFO at `path` read-only without waiting for a writer.
    pub fn open_fifo(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Path the stream was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a handle able to close this stream from another thread.
    #[must_use]
    pub fn closer(&self) -> StreamCloser {
        StreamCloser {
            closed: Arc::clone(&self.closed),
        }
    }

    fn wait_readable(&self) -> io::Result<()> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(closed_error());
            }

            let mut descriptors = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
            match poll(&mut descriptors, PollTimeout::from(POLL_SLICE_MS)) {
                Ok(0) | Err(Errno::EINTR) => {}
                Ok(_) => return Ok(()),
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }
    }
}

impl Read for LogStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.wait_readable()?;
            match self.file.read(buf) {
                Ok(read) => return Ok(read),
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(error) => return Err(error),
            }
        }
    }
}

/// Cloneable handle that closes a [`LogStream`].
#[derive(Debug, Clone)]
pub struct StreamCloser {
    closed: Arc<AtomicBool>,
}

impl StreamCloser {
    /// Marks the stream closed; pending and future reads fail with
    /// [`StreamClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Reports whether [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
