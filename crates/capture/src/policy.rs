//! Reconnection policy
//!
//! Failure bookkeeping shared by every source actor: a consecutive failure
//! counter and a cooldown between reconnection attempts.

use std::time::{Duration, Instant};

/// Decides when a source should drop its connection and reopen it.
///
/// Reconnection happens once `consecutive_failures >= threshold` and more than
/// `cooldown` has passed since the previous attempt. The first attempt is not
/// held back by the cooldown. Time is always passed in by the caller.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    last_attempt: Option<Instant>,
}

impl ReconnectPolicy {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            last_attempt: None,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count one failure. Returns `true` when this failure reached the threshold.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures == self.threshold
    }

    /// Treat the source as lost right away (e.g. the initial open failed).
    pub fn mark_disconnected(&mut self) {
        self.consecutive_failures = self.consecutive_failures.max(self.threshold);
    }

    pub fn should_reconnect(&self, now: Instant) -> bool {
        if self.consecutive_failures < self.threshold {
            return false;
        }
        match self.last_attempt {
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
            None => true,
        }
    }

    /// An open (initial or reconnect) was tried at `now`.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
