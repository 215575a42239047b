//! CaptureEvent / EventSink - operational reports
//!
//! Every recoverable condition is converted into a `CaptureEvent` at the layer
//! where it happens and handed to the sink that was passed in at construction.

use std::fmt;
use std::time::Duration;

use crate::SourceId;

/// Event severity, used by sinks to pick a log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Which batch was discarded when the output channel was full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroppedBatch {
    /// The batch that was being published
    Newest,
    /// The oldest queued batch, evicted to make room
    Oldest,
}

/// Reportable capture condition
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Consecutive read failures reached the reconnection threshold
    ConnectionLost {
        source_id: SourceId,
        consecutive_failures: u32,
    },

    /// Opening (or reopening) a connection failed; retried after the cooldown
    ReconnectionFailed { source_id: SourceId, message: String },

    /// A reconnection attempt succeeded
    Reconnected { source_id: SourceId },

    /// No result from a source within the collection timeout
    SourceTimeout {
        source_id: SourceId,
        sequence: u64,
        waited: Duration,
    },

    /// A batch could not be published without blocking
    OutputChannelFull {
        sequence: u64,
        capacity: usize,
        dropped: DroppedBatch,
    },

    /// A cycle took longer than the target period
    RateNotSustained {
        sequence: u64,
        period: Duration,
        elapsed: Duration,
    },

    /// Unrecoverable condition; the coordinator stops
    Fatal { message: String },
}

impl CaptureEvent {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Reconnected { .. } | Self::RateNotSustained { .. } => Severity::Info,
            Self::ConnectionLost { .. }
            | Self::ReconnectionFailed { .. }
            | Self::SourceTimeout { .. }
            | Self::OutputChannelFull { .. } => Severity::Warn,
            Self::Fatal { .. } => Severity::Error,
        }
    }

    /// Stable snake_case name (metric label, log field)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionLost { .. } => "connection_lost",
            Self::ReconnectionFailed { .. } => "reconnection_failed",
            Self::Reconnected { .. } => "reconnected",
            Self::SourceTimeout { .. } => "source_timeout",
            Self::OutputChannelFull { .. } => "output_channel_full",
            Self::RateNotSustained { .. } => "rate_not_sustained",
            Self::Fatal { .. } => "fatal",
        }
    }

    /// Source the event refers to, if any
    pub fn source_id(&self) -> Option<&SourceId> {
        match self {
            Self::ConnectionLost { source_id, .. }
            | Self::ReconnectionFailed { source_id, .. }
            | Self::Reconnected { source_id }
            | Self::SourceTimeout { source_id, .. } => Some(source_id),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost {
                source_id,
                consecutive_failures,
            } => write!(
                f,
                "source '{source_id}' lost after {consecutive_failures} consecutive failures"
            ),
            Self::ReconnectionFailed { source_id, message } => {
                write!(f, "reconnection to '{source_id}' failed: {message}")
            }
            Self::Reconnected { source_id } => write!(f, "source '{source_id}' reconnected"),
            Self::SourceTimeout {
                source_id,
                sequence,
                waited,
            } => write!(
                f,
                "source '{source_id}' timed out after {}ms in cycle {sequence}",
                waited.as_millis()
            ),
            Self::OutputChannelFull {
                sequence,
                capacity,
                dropped,
            } => write!(
                f,
                "output channel full (capacity {capacity}) at cycle {sequence}, dropped {dropped:?} batch"
            ),
            Self::RateNotSustained {
                sequence,
                period,
                elapsed,
            } => write!(
                f,
                "cycle {sequence} took {}ms, period is {}ms",
                elapsed.as_millis(),
                period.as_millis()
            ),
            Self::Fatal { message } => write!(f, "fatal: {message}"),
        }
    }
}

/// Receiver of capture events.
///
/// Implementations are called from actor and coordinator threads and must not
/// block for long.
pub trait EventSink: Send + Sync {
    fn report(&self, event: CaptureEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn report(&self, _event: CaptureEvent) {}
}
