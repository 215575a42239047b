//! Cadence pacing.

use std::time::{Duration, Instant};

/// What the driving loop should do once a cycle is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Cycle fit in the period; sleep this long before polling again
    Sleep(Duration),
    /// Cycle overran the period; start the next one right away
    Behind { elapsed: Duration },
}

/// Fixed-period pacer.
///
/// Only `fraction` of the remaining time is slept so that scheduler jitter
/// does not push the next cycle past its slot.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    fraction: f64,
}

impl Pacer {
    pub fn new(period: Duration, fraction: f64) -> Self {
        Self {
            period,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left before the next cycle is due, `None` if due now.
    pub fn time_until_due(&self, last_cycle: Option<Instant>, now: Instant) -> Option<Duration> {
        let since = now.saturating_duration_since(last_cycle?);
        self.period.checked_sub(since).filter(|left| !left.is_zero())
    }

    pub fn after_cycle(&self, started: Instant, finished: Instant) -> Pace {
        let elapsed = finished.saturating_duration_since(started);
        match self.period.checked_sub(elapsed) {
            Some(remaining) => Pace::Sleep(remaining.mul_f64(self.fraction)),
            None => Pace::Behind { elapsed },
        }
    }
}
