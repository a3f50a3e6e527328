//! Byte stuffing and block-check computation.
//!
//! Pure, stateless transforms used by both directions of the link:
//! - [`stuff`] makes an arbitrary byte run safe to place between two FLAGs.
//! - [`destuff`] reverses it, rejecting malformed escape sequences.
//! - [`checksum`] is the XOR block check used for BCC1 and BCC2.
//!
//! No I/O happens here.

use crate::frame::{ESC, ESC_ESC, ESC_FLAG, FLAG};

/// Errors detected while decoding one frame body.
///
/// These never reach the caller of [`crate::link::Link::receive`]; the link
/// answers them with a negative acknowledgment and keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// ESC followed by something other than `ESC_FLAG` / `ESC_ESC`, or by nothing.
    #[error("invalid escape sequence in frame body")]
    InvalidEscape,
    /// Recomputed BCC2 disagrees with the transmitted one.
    #[error("payload checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    ChecksumMismatch { expected: u8, found: u8 },
    /// Closing FLAG arrived before any body byte.
    #[error("frame body is empty")]
    FrameTooShort,
    /// Body grew past the configured bound without a closing FLAG.
    #[error("frame body exceeds the maximum frame size")]
    FrameTooLong,
}

/// Escape every FLAG and ESC byte in `data`.
///
/// The output never contains a literal FLAG.
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    stuff_into(data, &mut out);
    out
}

/// Like [`stuff`], but appends to an existing buffer.
pub fn stuff_into(data: &[u8], out: &mut Vec<u8>) {
    for &byte in data {
        match byte {
            FLAG => out.extend_from_slice(&[ESC, ESC_FLAG]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(byte),
        }
    }
}

/// Undo [`stuff`].
pub fn destuff(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter().copied();
    while let Some(byte) = bytes.next() {
        if byte != ESC {
            out.push(byte);
            continue;
        }
        match bytes.next() {
            Some(ESC_FLAG) => out.push(FLAG),
            Some(ESC_ESC) => out.push(ESC),
            _ => return Err(FrameError::InvalidEscape),
        }
    }
    Ok(out)
}

/// Running XOR of every byte in `data` (0 for an empty slice).
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}
