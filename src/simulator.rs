//! Fault-injecting byte stream for deterministic testing.
//!
//! A serial line loses and garbles data.  To exercise the retransmission
//! paths without real hardware, [`Simulator`] wraps any byte stream and
//! applies a seeded fault model to every write call:
//!
//! | Fault      | Effect                                                    |
//! |------------|-----------------------------------------------------------|
//! | Drop       | The whole write is swallowed (reported as written).       |
//! | Corruption | The low bit of the second-to-last byte is flipped.        |
//!
//! The link writes each frame with a single `write_all`, so one write is one
//! frame.  The second-to-last byte of a frame is BCC1 for supervision frames
//! and the (stuffed) BCC2 for information frames.  A flipped BCC1 fails the
//! header check.  A flipped escape substitute, or a BCC2 of `0x7C` turned into
//! ESC, fails destuffing.  A BCC2 of `0x7F` turns into FLAG and closes the
//! frame one byte early; the truncated body is then caught by its own
//! checksum, unless its last byte happens to equal the XOR of the rest.
//!
//! Reads pass through untouched.  The wrapped stream should accept whole
//! writes without returning `Pending` (a roomy `tokio::io::duplex` does).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Configuration for the fault model.
///
/// Probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a write is silently dropped.
    pub drop_rate: f64,
    /// Probability that a (not dropped) write is corrupted.
    pub corrupt_rate: f64,
    /// RNG seed; equal seeds give equal fault sequences.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; simulator is a transparent pass-through.
        Self {
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

/// Counts of faults actually applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaultStats {
    pub writes: u64,
    pub dropped: u64,
    pub corrupted: u64,
}

/// A fault-injecting wrapper around a byte stream.
#[derive(Debug)]
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    stats: FaultStats,
}

impl<T> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            stats: FaultStats::default(),
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Simulator<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Simulator<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }
        this.stats.writes += 1;

        if this.rng.random_bool(this.config.drop_rate) {
            this.stats.dropped += 1;
            log::trace!("[sim] dropped {} byte(s)", buf.len());
            return Poll::Ready(Ok(buf.len()));
        }

        if buf.len() >= 2 && this.rng.random_bool(this.config.corrupt_rate) {
            this.stats.corrupted += 1;
            let mut garbled = buf.to_vec();
            let victim = garbled.len() - 2;
            garbled[victim] ^= 0x01;
            log::trace!("[sim] corrupted byte {victim} of {}", buf.len());
            return Pin::new(&mut this.inner).poll_write(cx, &garbled);
        }

        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
