//! Event sinks

use std::sync::Mutex;

use contracts::{CaptureEvent, EventSink, Severity};
use tracing::{error, info, warn};

use crate::metrics::record_event;

/// Logs every event at its severity and counts it in
/// `multicapture_events_total`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn report(&self, event: CaptureEvent) {
        record_event(&event);

        let kind = event.kind();
        let source_id = event.source_id().map(|id| id.as_str()).unwrap_or("-");
        match event.severity() {
            Severity::Info => info!(kind, source_id, "{event}"),
            Severity::Warn => warn!(kind, source_id, "{event}"),
            Severity::Error => error!(kind, source_id, "{event}"),
        }
    }
}

/// 内存收集器，测试与统计用
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<CaptureEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far, in order.
    pub fn events(&self) -> Vec<CaptureEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of events of the given [`CaptureEvent::kind`].
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| e.kind() == kind).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for CollectingSink {
    fn report(&self, event: CaptureEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_collecting_sink_counts_by_kind() {
        let sink = CollectingSink::new();
        sink.report(CaptureEvent::Reconnected {
            source_id: "a".into(),
        });
        sink.report(CaptureEvent::RateNotSustained {
            sequence: 1,
            period: Duration::from_millis(100),
            elapsed: Duration::from_millis(500),
        });
        sink.report(CaptureEvent::Reconnected {
            source_id: "b".into(),
        });

        assert_eq!(sink.count("reconnected"), 2);
        assert_eq!(sink.count("rate_not_sustained"), 1);
        assert_eq!(sink.count("fatal"), 0);
        assert_eq!(sink.events()[1].kind(), "rate_not_sustained");

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_tracing_sink_without_subscriber() {
        TracingSink::new().report(CaptureEvent::Fatal {
            message: "stream backend gone".to_string(),
        });
    }
}
