//! Link configuration.

use std::time::Duration;

use crate::timer::RetryPolicy;

/// Largest payload accepted by default (one 256-byte frame buffer).
pub const DEFAULT_MAX_PAYLOAD: usize = 256;

/// Tunables for one [`crate::link::Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Timeout and attempt budget for connect, send and disconnect.
    pub retry: RetryPolicy,
    /// Maximum payload per information frame, before stuffing.
    pub max_payload: usize,
}

impl LinkConfig {
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.retry.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}
