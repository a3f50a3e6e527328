//! Byte-stream abstraction over the serial line.
//!
//! [`Channel`] is a thin wrapper around any `AsyncRead + AsyncWrite` stream
//! (a serial device opened as a file, an in-memory duplex pipe in tests).
//! It writes whole frames and reads single bytes with an optional deadline.
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout_at, Instant};

/// A byte-oriented channel to the peer.
#[derive(Debug)]
pub struct Channel<T> {
    inner: BufReader<T>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Channel<T> {
    pub fn new(io: T) -> Self {
        Self {
            inner: BufReader::new(io),
        }
    }

    /// Write a complete frame and flush it.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        Ok(frame.len())
    }

    /// Read the next byte, waiting as long as it takes.
    ///
    /// End-of-stream is reported as [`io::ErrorKind::UnexpectedEof`].
    pub async fn read_byte(&mut self) -> io::Result<u8> {
        self.inner.read_u8().await
    }

    /// Read the next byte unless `deadline` passes first.
    ///
    /// `Ok(None)` means the deadline passed with nothing to read.  A `None`
    /// deadline waits forever.  No byte is lost when the deadline wins.
    pub async fn read_byte_until(&mut self, deadline: Option<Instant>) -> io::Result<Option<u8>> {
        match deadline {
            None => self.read_byte().await.map(Some),
            Some(deadline) => match timeout_at(deadline, self.inner.read_u8()).await {
                Ok(byte) => byte.map(Some),
                Err(_elapsed) => Ok(None),
            },
        }
    }

    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Recover the underlying stream.  Bytes already buffered are discarded.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
