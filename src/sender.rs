//! Outbound frame state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the transmit sequence bit and the single in-flight
//! frame.  It does **not** touch the channel; [`crate::link::Link`] calls
//! these methods and owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** frame is in flight at any moment (`unacked`).
//! - The in-flight frame is built once and retransmitted byte-for-byte.
//! - On RR for the other sequence value: toggle `ns`; clear `unacked`.
//! - On REJ for the current sequence value: retransmit immediately.
//! - On giving up: clear `unacked`, leave `ns` unchanged.

use crate::frame::{information_frame, Seq};

/// A frame that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// Exact bytes on the wire.
    pub frame: Vec<u8>,
    /// Payload length, reported back to the caller on success.
    pub payload_len: usize,
    /// How many times this frame has been transmitted (1 = first send).
    pub tx_count: u32,
}

/// What an acknowledgment frame means for the in-flight frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// RR for the next sequence value: the frame was delivered.
    Acked { payload_len: usize },
    /// REJ for the current sequence value: resend now.
    Rejected,
    /// Anything else, including acks when nothing is in flight.
    Ignored,
}

/// Stop-and-wait send-side state for one link.
#[derive(Debug, Default)]
pub struct Sender {
    /// Sequence bit for the current (or next) information frame.
    pub ns: Seq,
    /// The in-flight frame, or `None` when idle.
    pub unacked: Option<RetransmitEntry>,
}

impl Sender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the information frame for `payload` and make it the in-flight frame.
    ///
    /// Returns the bytes to transmit.  A frame left over from a send that
    /// failed on the channel is replaced.
    pub fn begin(&mut self, addr: u8, payload: &[u8]) -> &[u8] {
        let entry = self.unacked.insert(RetransmitEntry {
            frame: information_frame(addr, self.ns, payload),
            payload_len: payload.len(),
            tx_count: 0,
        });
        &entry.frame
    }

    /// Control values that end the wait for the in-flight frame.
    pub fn awaited_controls(&self) -> [u8; 2] {
        [self.ns.toggled().rr_control(), self.ns.rej_control()]
    }

    /// Record one more transmission of the in-flight frame.
    pub fn on_transmit(&mut self) {
        if let Some(ref mut e) = self.unacked {
            e.tx_count += 1;
        }
    }

    /// The bytes to (re)transmit, if a frame is in flight.
    pub fn in_flight(&self) -> Option<&[u8]> {
        self.unacked.as_ref().map(|e| e.frame.as_slice())
    }

    /// Classify an acknowledgment control byte.
    ///
    /// On [`AckOutcome::Acked`] the sequence bit toggles and the slot clears.
    pub fn on_ack(&mut self, ctrl: u8) -> AckOutcome {
        let Some(entry) = &self.unacked else {
            return AckOutcome::Ignored;
        };
        if ctrl == self.ns.toggled().rr_control() {
            let payload_len = entry.payload_len;
            self.unacked = None;
            self.ns = self.ns.toggled();
            AckOutcome::Acked { payload_len }
        } else if ctrl == self.ns.rej_control() {
            AckOutcome::Rejected
        } else {
            AckOutcome::Ignored
        }
    }

    /// Give up on the in-flight frame without touching `ns`.
    pub fn abandon(&mut self) -> Option<RetransmitEntry> {
        self.unacked.take()
    }

    /// Transmissions of the in-flight frame so far, `0` when idle.
    pub fn retransmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }
}
