//! Link finite-state machine types.
//!
//! ```text
//!  IDLE ──connect──▶ AWAITING(UA | SET) ──▶ ESTABLISHED ──send gives up──▶ FAILED
//!                                                │ disconnect                 │
//!                                                ▼                            │
//!                      CLOSED ◀── AWAITING(DISC | UA) ◀──────disconnect───────┘
//! ```
//!
//! Transitions live in [`crate::link`]; this module only names the states.

use crate::frame::address;

/// Which end of the link this station is.  Fixed for the link's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends SET and starts the connection.
    Initiator,
    /// Waits for SET and answers UA.
    Responder,
}

impl Role {
    /// Address this station stamps on its own frames.
    pub fn local_address(self) -> u8 {
        match self {
            Role::Initiator => address::INITIATOR,
            Role::Responder => address::RESPONDER,
        }
    }

    /// Address expected on frames from the other station.
    pub fn peer_address(self) -> u8 {
        match self {
            Role::Initiator => address::RESPONDER,
            Role::Responder => address::INITIATOR,
        }
    }
}

/// Supervision frame a lifecycle step is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Set,
    Ua,
    Disc,
}

/// All states of the link FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No handshake attempted yet.
    #[default]
    Idle,
    /// Handshake or teardown in progress.
    AwaitingPeerFrame(Expected),
    /// SET/UA completed; data may flow.
    Established,
    /// A send exhausted its retries; only `disconnect` is allowed.
    Failed,
    /// Teardown finished or abandoned.
    Closed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::AwaitingPeerFrame(e) => write!(f, "AwaitingPeerFrame({e:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}
