//! Capture session: owns the coordinator and consumes its batches.
//!
//! Runs on a blocking thread; the async side only waits for it and for
//! shutdown signals.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use capture::SyntheticBackend;
use contracts::{
    CaptureConfig, CaptureEvent, EventSink, Lifecycle, LifecycleState, StreamBackend,
};
use observability::{record_batch_metrics, TracingSink};
use sync_engine::Coordinator;
use tracing::{debug, info, warn};

use super::RunStats;
use crate::error::CliError;

/// Upper bound on how long a shutdown request goes unnoticed.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub capture: CaptureConfig,

    /// Maximum number of batches to consume (None = unlimited)
    pub max_batches: Option<u64>,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,
}

/// One capture run from start to shutdown
pub struct CaptureSession {
    config: SessionConfig,
    backend: Arc<dyn StreamBackend>,
    shutdown: Lifecycle,
}

impl CaptureSession {
    /// Session over the synthetic backend.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_backend(config, Arc::new(SyntheticBackend::new()))
    }

    pub fn with_backend(config: SessionConfig, backend: Arc<dyn StreamBackend>) -> Self {
        Self {
            config,
            backend,
            shutdown: Lifecycle::new(),
        }
    }

    /// Handle that ends the session from another thread.
    pub fn shutdown_handle(&self) -> Lifecycle {
        self.shutdown.clone()
    }

    /// Run until shutdown, timeout, the batch limit, or a fatal coordinator error.
    pub fn run(self) -> Result<RunStats> {
        let start_time = Instant::now();
        let sink = Arc::new(StatsSink::new());

        let mut coordinator =
            Coordinator::new(&self.config.capture, self.backend.clone(), sink.clone())
                .map_err(CliError::from)
                .context("Failed to create coordinator")?;
        coordinator.start().map_err(CliError::from)?;

        info!(
            backend = self.backend.name(),
            sources = ?coordinator.source_ids(),
            frame_rate = self.config.capture.frame_rate,
            max_batches = ?self.config.max_batches,
            "Capture running"
        );

        let deadline = self.config.timeout.map(|t| start_time + t);
        let mut stats = RunStats {
            sources: coordinator.source_ids().len(),
            ..Default::default()
        };
        let mut last_arrival: Option<Instant> = None;

        loop {
            if self.shutdown.is_stop_requested() {
                info!("Shutdown requested");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    timeout_secs = self.config.timeout.map(|t| t.as_secs()),
                    "Capture timed out"
                );
                break;
            }
            if coordinator.state() != LifecycleState::Running {
                warn!("Coordinator stopped on its own");
                break;
            }

            let Some(batch) = coordinator.next_batch_timeout(POLL_INTERVAL) else {
                continue;
            };

            let now = Instant::now();
            let interval_ms = last_arrival.map(|t| (now - t).as_secs_f64() * 1000.0);
            last_arrival = Some(now);

            record_batch_metrics(&batch);
            stats.record_batch(&batch, interval_ms);

            let missing = batch.missing_sources();
            info!(
                sequence = batch.sequence,
                captured = batch.success_count(),
                missing = ?missing,
                "Batch received"
            );

            if let Some(max) = self.config.max_batches {
                if stats.batches_received >= max {
                    info!(batches = stats.batches_received, "Reached max batches limit");
                    break;
                }
            }
        }

        debug!("Stopping coordinator");
        coordinator.stop();

        stats.coordinator = coordinator.stats().snapshot();
        stats.events = sink.counts();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            batches = stats.batches_received,
            "Capture shutdown complete"
        );

        match sink.fatal() {
            Some(message) => {
                stats.print_summary();
                Err(CliError::Fatal { message }.into())
            }
            None => Ok(stats),
        }
    }
}

/// Logs through [`TracingSink`] and keeps per-kind counts for the summary.
struct StatsSink {
    inner: TracingSink,
    counts: Mutex<BTreeMap<&'static str, u64>>,
    fatal: Mutex<Option<String>>,
}

impl StatsSink {
    fn new() -> Self {
        Self {
            inner: TracingSink::new(),
            counts: Mutex::new(BTreeMap::new()),
            fatal: Mutex::new(None),
        }
    }

    fn counts(&self) -> BTreeMap<&'static str, u64> {
        self.counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }

    fn fatal(&self) -> Option<String> {
        self.fatal.lock().ok().and_then(|fatal| fatal.clone())
    }
}

impl EventSink for StatsSink {
    fn report(&self, event: CaptureEvent) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(event.kind()).or_insert(0) += 1;
        }
        if let CaptureEvent::Fatal { message } = &event {
            if let Ok(mut fatal) = self.fatal.lock() {
                *fatal = Some(message.clone());
            }
        }
        self.inner.report(event);
    }
}
