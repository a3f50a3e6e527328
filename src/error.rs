//! User-visible link errors.
//!
//! Frame-level corruption ([`crate::codec::FrameError`]) is recovered inside
//! the link and never appears here; only I/O failures, exhausted retry
//! budgets and caller mistakes do.

use thiserror::Error;

use crate::state::LinkState;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The underlying byte stream failed or reached end-of-file.
    #[error("channel I/O error: {0}")]
    Channel(#[from] std::io::Error),

    /// No UA answered our SET within the retry budget.
    #[error("link establishment failed after {attempts} attempt(s)")]
    LinkEstablishFailed { attempts: u32 },

    /// DISC/UA teardown did not complete within the retry budget.
    #[error("link close failed after {attempts} attempt(s)")]
    LinkCloseFailed { attempts: u32 },

    /// An information frame was never acknowledged.
    #[error("frame not acknowledged after {attempts} transmission(s)")]
    MaxRetriesExceeded { attempts: u32 },

    /// The peer sent DISC instead of data.
    #[error("peer disconnected")]
    PeerDisconnected,

    /// Operation not allowed in the current link state.
    #[error("operation invalid in state {0}")]
    BadState(LinkState),

    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// The frame was left unacknowledged; retry with a larger buffer.
    #[error("receive buffer holds {capacity} bytes but the frame carries {needed}")]
    BufferTooSmall { needed: usize, capacity: usize },
}

impl LinkError {
    /// `true` for errors that leave the link unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            LinkError::PayloadTooLarge { .. } | LinkError::BufferTooSmall { .. }
        )
    }
}
