//! `serial-arq` : a stop-and-wait ARQ data link over an unreliable byte stream.
//!
//! # Architecture
//!
//! ```text
//!   Application
//!       │  connect / send / receive / disconnect
//!  ┌────▼──────────────────────────────────────┐
//!  │                 Link                      │
//!  │  (owns state machine, Ns bits, channel)   │
//!  └──┬───────────┬───────────┬────────────┬───┘
//!     │           │           │            │
//!  Sender     Receiver    RetryTimer   FrameParser
//!     │           │                        │
//!     └──── frame / codec (stuffing, BCC) ─┘
//!       │ raw bytes
//!  ┌────▼──────┐
//!  │  Channel  │  (any tokio AsyncRead + AsyncWrite: serial port, pipe)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`codec`]      - byte stuffing / destuffing and XOR block check
//! - [`frame`]      - wire constants, frame builders, body decoding
//! - [`parser`]     - byte-at-a-time recognizer shared by every wait
//! - [`sender`]     - stop-and-wait outbound frame state
//! - [`receiver`]   - inbound sequence tracking and duplicate suppression
//! - [`timer`]      - retry policy and per-operation deadline
//! - [`state`]      - link FSM and station roles
//! - [`link`]       - the link handle tying everything together
//! - [`channel`]    - byte I/O with deadlines
//! - [`simulator`]  - lossy stream wrapper for testing
//! - [`config`] / [`error`]

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod parser;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod state;
pub mod timer;

pub use codec::FrameError;
pub use config::LinkConfig;
pub use error::LinkError;
pub use frame::Seq;
pub use link::{Link, LinkStats};
pub use state::{LinkState, Role};
pub use timer::RetryPolicy;
