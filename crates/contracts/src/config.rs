//! Capture configuration contracts shared by the loader, the engine and the CLI.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use validator::Validate;

use crate::SourceId;

/// Default failure tolerance window in seconds (threshold = multiplier x rate)
pub const DEFAULT_FAILURE_THRESHOLD_MULTIPLIER: u32 = 30;

/// Default minimum interval between reconnection attempts
pub const DEFAULT_RECONNECT_COOLDOWN_MS: u64 = 30_000;

/// Default output channel capacity (batches)
pub const DEFAULT_OUTPUT_CAPACITY: usize = 10;

/// Top-level capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureConfig {
    /// Sources in registration order; batch entries follow this order
    #[validate(length(min = 1, message = "at least one source is required"), nested)]
    pub sources: Vec<SourceConfig>,

    /// Target batches per second
    #[serde(default = "default_frame_rate")]
    #[validate(range(min = 1, message = "frame_rate must be > 0"))]
    pub frame_rate: u32,

    /// Per-source failure threshold is `multiplier * frame_rate` consecutive failures
    #[serde(default = "default_failure_threshold_multiplier")]
    #[validate(range(min = 1))]
    pub failure_threshold_multiplier: u32,

    /// Minimum interval between reconnection attempts (milliseconds)
    #[serde(default = "default_reconnect_cooldown_ms")]
    pub reconnect_cooldown_ms: u64,

    /// Per-source collection timeout as a fraction of the period
    #[serde(default = "default_collect_timeout_fraction")]
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub collect_timeout_fraction: f64,

    /// Fraction of the remaining period actually slept after a cycle
    #[serde(default = "default_pacing_fraction")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub pacing_fraction: f64,

    /// Output channel capacity (batches)
    #[serde(default = "default_output_capacity")]
    #[validate(range(min = 1))]
    pub output_capacity: usize,

    /// What to drop when the output channel is full
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Wait after a failed advance (milliseconds); defaults to one period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_backoff_ms: Option<u64>,
}

/// One capture source
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Explicit id; derived from `address` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SourceId>,

    /// Device index or stream URL
    #[validate(length(min = 1, message = "address must not be empty"))]
    pub address: String,
}

impl SourceConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: None,
            address: address.into(),
        }
    }

    /// Effective id of this source.
    pub fn source_id(&self) -> SourceId {
        self.id
            .clone()
            .unwrap_or_else(|| SourceId::from_address(&self.address))
    }
}

/// Backpressure policy of the output channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the batch that did not fit
    #[default]
    DropNewest,
    /// Evict the oldest queued batch so the newest one is kept
    DropOldest,
}

fn default_frame_rate() -> u32 {
    1
}

fn default_failure_threshold_multiplier() -> u32 {
    DEFAULT_FAILURE_THRESHOLD_MULTIPLIER
}

fn default_reconnect_cooldown_ms() -> u64 {
    DEFAULT_RECONNECT_COOLDOWN_MS
}

fn default_collect_timeout_fraction() -> f64 {
    0.9
}

fn default_pacing_fraction() -> f64 {
    0.95
}

fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

impl CaptureConfig {
    /// Configuration with defaults for the given addresses and rate.
    pub fn new<I, S>(addresses: I, frame_rate: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: addresses.into_iter().map(SourceConfig::new).collect(),
            frame_rate,
            failure_threshold_multiplier: default_failure_threshold_multiplier(),
            reconnect_cooldown_ms: default_reconnect_cooldown_ms(),
            collect_timeout_fraction: default_collect_timeout_fraction(),
            pacing_fraction: default_pacing_fraction(),
            output_capacity: default_output_capacity(),
            overflow_policy: OverflowPolicy::default(),
            failure_backoff_ms: None,
        }
    }

    /// Cadence period (`1 / frame_rate`)
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }

    /// Consecutive failures after which a source reconnects
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold_multiplier
            .saturating_mul(self.frame_rate)
            .max(1)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }

    /// Per-source wait in the collection phase; always below one period
    pub fn collect_timeout(&self) -> Duration {
        self.period().mul_f64(self.collect_timeout_fraction.clamp(0.0, 1.0))
    }

    pub fn failure_backoff(&self) -> Duration {
        self.failure_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.period())
    }

    /// Source ids in registration order
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(SourceConfig::source_id).collect()
    }

    /// First source whose id repeats an earlier one, with its index.
    ///
    /// Ids derived from addresses drop credentials, so two addresses that
    /// differ only in user/password collide.
    pub fn duplicate_source_id(&self) -> Option<(usize, SourceId)> {
        let mut seen = HashSet::new();
        self.source_ids()
            .into_iter()
            .enumerate()
            .find(|(_, id)| !seen.insert(id.clone()))
    }
}
