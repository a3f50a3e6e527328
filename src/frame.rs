//! Wire-format definitions for link frames.
//!
//! Two frame kinds share one header layout:
//!
//! ```text
//!  Supervision:  FLAG | A | C | A^C | FLAG
//!  Information:  FLAG | A | C(Ns) | A^C | stuff(payload) | stuff(BCC2) | FLAG
//! ```
//!
//! `A` is the transmitting station's own address, `BCC2` is the XOR of the
//! unstuffed payload.  Only the body of an information frame is stuffed; the
//! header never contains a FLAG because every address/control value is fixed.
//!
//! This module builds frames and decodes frame bodies; recognising frames in
//! a byte stream is the job of [`crate::parser`].

use crate::codec::{checksum, destuff, stuff_into, FrameError};

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;
/// Escape marker inside an information frame body.
pub const ESC: u8 = 0x7D;
/// `ESC ESC_FLAG` encodes a literal FLAG.
pub const ESC_FLAG: u8 = 0x5E;
/// `ESC ESC_ESC` encodes a literal ESC.
pub const ESC_ESC: u8 = 0x5D;

/// Length of every supervision frame on the wire.
pub const SUPERVISION_LEN: usize = 5;

/// Station addresses.
pub mod address {
    /// Stamped on frames sent by the initiating station.
    pub const INITIATOR: u8 = 0x03;
    /// Stamped on frames sent by the responding station.
    pub const RESPONDER: u8 = 0x01;
}

/// Control-field values.
pub mod control {
    pub const SET: u8 = 0x03;
    pub const UA: u8 = 0x07;
    pub const DISC: u8 = 0x0B;
    pub const I_0: u8 = 0x00;
    pub const I_1: u8 = 0x40;
    pub const RR_0: u8 = 0x05;
    pub const RR_1: u8 = 0x85;
    pub const REJ_0: u8 = 0x01;
    pub const REJ_1: u8 = 0x81;

    /// `true` for the two information-frame controls.
    pub fn is_information(c: u8) -> bool {
        c == I_0 || c == I_1
    }

    /// Short mnemonic used in log lines.
    pub fn name(c: u8) -> &'static str {
        match c {
            SET => "SET",
            UA => "UA",
            DISC => "DISC",
            I_0 => "I(0)",
            I_1 => "I(1)",
            RR_0 => "RR(0)",
            RR_1 => "RR(1)",
            REJ_0 => "REJ(0)",
            REJ_1 => "REJ(1)",
            _ => "?",
        }
    }
}

/// One-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Seq {
    #[default]
    Zero,
    One,
}

impl Seq {
    /// The other value.
    pub fn toggled(self) -> Self {
        match self {
            Seq::Zero => Seq::One,
            Seq::One => Seq::Zero,
        }
    }

    /// Control byte of an information frame carrying this Ns.
    pub fn info_control(self) -> u8 {
        match self {
            Seq::Zero => control::I_0,
            Seq::One => control::I_1,
        }
    }

    /// Control byte of an RR announcing this value as the next expected Ns.
    pub fn rr_control(self) -> u8 {
        match self {
            Seq::Zero => control::RR_0,
            Seq::One => control::RR_1,
        }
    }

    /// Control byte of a REJ for a frame carrying this Ns.
    pub fn rej_control(self) -> u8 {
        match self {
            Seq::Zero => control::REJ_0,
            Seq::One => control::REJ_1,
        }
    }

    /// Sequence bit carried by an information-frame control byte.
    pub fn from_info_control(c: u8) -> Option<Self> {
        match c {
            control::I_0 => Some(Seq::Zero),
            control::I_1 => Some(Seq::One),
            _ => None,
        }
    }
}

impl From<Seq> for u8 {
    fn from(seq: Seq) -> u8 {
        match seq {
            Seq::Zero => 0,
            Seq::One => 1,
        }
    }
}

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Build a 5-byte supervision frame.
pub fn supervision_frame(addr: u8, ctrl: u8) -> [u8; SUPERVISION_LEN] {
    [FLAG, addr, ctrl, addr ^ ctrl, FLAG]
}

/// Build a complete information frame for `payload` with sequence bit `ns`.
///
/// BCC2 is computed over the unstuffed payload and then stuffed itself.
pub fn information_frame(addr: u8, ns: Seq, payload: &[u8]) -> Vec<u8> {
    let ctrl = ns.info_control();
    let mut buf = Vec::with_capacity(payload.len() + payload.len() / 8 + 8);
    buf.extend_from_slice(&[FLAG, addr, ctrl, addr ^ ctrl]);
    stuff_into(payload, &mut buf);
    stuff_into(&[checksum(payload)], &mut buf);
    buf.push(FLAG);
    buf
}

/// Upper bound on the stuffed body length for a payload limit.
///
/// Worst case every payload byte and BCC2 are escaped.
pub fn max_body_len(max_payload: usize) -> usize {
    max_payload.saturating_add(1).saturating_mul(2)
}

/// Decode the raw bytes found between the header and the closing FLAG.
///
/// Returns the payload with the trailing BCC2 verified and removed.
pub fn decode_body(raw: &[u8]) -> Result<Vec<u8>, FrameError> {
    if raw.is_empty() {
        return Err(FrameError::FrameTooShort);
    }
    let mut body = destuff(raw)?;
    // A non-empty stuffed run always destuffs to at least one byte.
    let found = body.pop().ok_or(FrameError::FrameTooShort)?;
    let expected = checksum(&body);
    if expected != found {
        return Err(FrameError::ChecksumMismatch { expected, found });
    }
    Ok(body)
}
