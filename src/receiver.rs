//! Inbound information-frame handling.
//!
//! The [`Receiver`] decides what happens to each information frame the
//! parser hands over: deliver it, treat it as a duplicate, or reject it.  It
//! mirrors the peer's sequence bit independently of [`crate::sender::Sender`].
//!
//! The [`Receiver`] does **not** send acknowledgments itself; it returns the
//! control byte that [`crate::link::Link`] should answer with.

use crate::codec::FrameError;
use crate::frame::Seq;

/// Decision for one complete information frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// New data for the expected Ns.  `ack` is RR(new expected Ns).
    Deliver { payload: Vec<u8>, ack: u8 },
    /// Valid retransmission of the previous frame.  `ack` repeats RR.
    Duplicate { ack: u8 },
    /// Corrupted frame for the expected Ns.  `nack` is REJ(expected Ns).
    Reject { nack: u8, reason: FrameError },
    /// Corrupted frame for the other Ns; nothing to answer.
    Discard,
}

/// Receive-side sequence state for one link.
#[derive(Debug, Default)]
pub struct Receiver {
    /// Ns the next new frame must carry.
    pub expected: Seq,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a frame without changing state.
    pub fn classify(&self, ns: Seq, body: &Result<Vec<u8>, FrameError>) -> Verdict {
        match (ns == self.expected, body) {
            (true, Ok(payload)) => Verdict::Deliver {
                payload: payload.clone(),
                ack: self.expected.toggled().rr_control(),
            },
            (true, Err(reason)) => Verdict::Reject {
                nack: self.expected.rej_control(),
                reason: *reason,
            },
            (false, Ok(_)) => Verdict::Duplicate {
                ack: self.expected.rr_control(),
            },
            (false, Err(_)) => Verdict::Discard,
        }
    }

    /// Classify a frame and, if it is new data, advance the expected Ns.
    pub fn on_frame(&mut self, ns: Seq, body: Result<Vec<u8>, FrameError>) -> Verdict {
        let verdict = self.classify(ns, &body);
        if matches!(verdict, Verdict::Deliver { .. }) {
            self.expected = self.expected.toggled();
        }
        verdict
    }
}
