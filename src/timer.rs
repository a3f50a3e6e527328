//! Retransmit timer and per-operation retry budget.
//!
//! Every blocking operation (connect, send, disconnect) owns one
//! [`RetryTimer`].  The timer is nothing more than an optional deadline plus
//! an attempt counter:
//!
//! - [`RetryTimer::try_arm`] starts a new attempt and sets the deadline, or
//!   reports that the budget is spent.
//! - The read loop passes [`RetryTimer::deadline`] straight to
//!   [`crate::channel::Channel::read_byte_until`]; the deadline is the only
//!   source of truth for "this wait is over".
//! - [`RetryTimer::cancel`] clears the deadline on success.  A cancelled timer
//!   never reports expiry, so a late wake-up cannot be mistaken for a timeout.

use std::time::Duration;

use tokio::time::Instant;

/// Classic link-layer defaults: 3 s per attempt, 3 attempts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Timeout / retry parameters shared by connect, send and disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long to wait for the peer after each transmission.
    pub timeout: Duration,
    /// Maximum number of transmissions per operation (at least 1).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Single-shot deadline with a bounded number of re-arms.
#[derive(Debug)]
pub struct RetryTimer {
    policy: RetryPolicy,
    attempts: u32,
    deadline: Option<Instant>,
}

impl RetryTimer {
    /// Fresh timer: disarmed, zero attempts used.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            deadline: None,
        }
    }

    /// Begin the next attempt.
    ///
    /// Returns `false` (and stays disarmed) once `max_attempts` attempts have
    /// been started.
    pub fn try_arm(&mut self) -> bool {
        if self.attempts >= self.policy.max_attempts.max(1) {
            self.deadline = None;
            return false;
        }
        self.attempts += 1;
        self.deadline = Some(Instant::now() + self.policy.timeout);
        true
    }

    /// Disarm; [`deadline`](Self::deadline) reports `None` until the next arm.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Current deadline, `None` when disarmed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
