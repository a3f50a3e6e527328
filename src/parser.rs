//! Byte-at-a-time frame recognizer.
//!
//! A single [`FrameParser`] handles every frame the link waits for: SET, UA,
//! DISC, RR/REJ and information frames.  It is parameterised by the peer's
//! address and the set of control values the current operation cares about;
//! any other control value makes it fall back to hunting for a FLAG.
//!
//! ```text
//!            FLAG          peer A         accepted C      A^C
//!  Idle ──────────▶ SawFlag ─────▶ SawAddress ─────▶ SawControl ──┬──▶ AwaitClose ──FLAG──▶ Supervision
//!                                                                  └──▶ Body ──────FLAG──▶ Information
//! ```
//!
//! A FLAG seen in the middle of a header (or a stray byte while waiting for
//! the closing FLAG) restarts from `SawFlag`; any other mismatch restarts from
//! `Idle`.  After a frame completes the parser sits in `SawFlag`, so two
//! frames sharing one FLAG are both recognised.

use crate::codec::FrameError;
use crate::frame::{control, decode_body, FLAG};

/// A complete frame pulled out of the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Header-only frame (SET, UA, DISC, RR, REJ).
    Supervision { control: u8 },
    /// Information frame; `body` is the verified payload or why it was rejected.
    Information {
        control: u8,
        body: Result<Vec<u8>, FrameError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SawFlag,
    SawAddress,
    SawControl(u8),
    AwaitClose(u8),
    Body(u8),
}

/// Incremental recognizer for frames from one peer.
#[derive(Debug)]
pub struct FrameParser {
    peer: u8,
    accepts: Vec<u8>,
    max_body: usize,
    state: State,
    scratch: Vec<u8>,
}

impl FrameParser {
    /// Recognise frames stamped with `peer` whose control byte is in `accepts`.
    ///
    /// `max_body` bounds the raw (still stuffed) information-frame body.
    pub fn new(peer: u8, accepts: &[u8], max_body: usize) -> Self {
        Self {
            peer,
            accepts: accepts.to_vec(),
            max_body,
            state: State::Idle,
            scratch: Vec::new(),
        }
    }

    /// Drop any partial frame and wait for the next FLAG.
    fn reset(&mut self) {
        self.state = State::Idle;
        self.scratch.clear();
    }

    /// Feed one byte; returns an event when it completes a frame.
    pub fn feed(&mut self, byte: u8) -> Option<Event> {
        match self.state {
            State::Idle => {
                if byte == FLAG {
                    self.state = State::SawFlag;
                } else {
                    log::trace!("[parser] skip {byte:#04x}");
                }
                None
            }
            State::SawFlag => {
                self.state = match byte {
                    b if b == self.peer => State::SawAddress,
                    FLAG => State::SawFlag,
                    _ => State::Idle,
                };
                None
            }
            State::SawAddress => {
                self.state = match byte {
                    FLAG => State::SawFlag,
                    c if self.accepts.contains(&c) => State::SawControl(c),
                    _ => State::Idle,
                };
                None
            }
            State::SawControl(c) => {
                self.state = if byte == self.peer ^ c {
                    if control::is_information(c) {
                        self.scratch.clear();
                        State::Body(c)
                    } else {
                        State::AwaitClose(c)
                    }
                } else if byte == FLAG {
                    State::SawFlag
                } else {
                    State::Idle
                };
                None
            }
            State::AwaitClose(c) => {
                if byte == FLAG {
                    self.state = State::SawFlag;
                    Some(Event::Supervision { control: c })
                } else {
                    self.state = State::Idle;
                    None
                }
            }
            State::Body(c) => {
                if byte == FLAG {
                    self.state = State::SawFlag;
                    let body = decode_body(&self.scratch);
                    self.scratch.clear();
                    return Some(Event::Information { control: c, body });
                }
                if self.scratch.len() >= self.max_body {
                    self.reset();
                    return Some(Event::Information {
                        control: c,
                        body: Err(FrameError::FrameTooLong),
                    });
                }
                self.scratch.push(byte);
                None
            }
        }
    }

    /// Feed a slice, returning every event it completes in order.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<Event> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }
}
