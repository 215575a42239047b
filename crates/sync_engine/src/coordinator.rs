//! Coordinator: shared clock, fan-out of requests, bounded fan-in, publishing.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use capture::{ActorSettings, CaptureError, SourceActor};
use contracts::{
    Batch, CaptureConfig, CaptureEvent, DroppedBatch, EventSink, FailureKind, FrameRecord,
    Lifecycle, LifecycleState, OverflowPolicy, SourceId, StreamBackend,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use metrics::{gauge, histogram};
use tracing::{debug, error, info, instrument, trace, warn};
use validator::Validate;

use crate::error::{Result, SyncError};
use crate::pacer::{Pace, Pacer};
use crate::stats::CoordinatorStats;

/// Longest uninterrupted sleep of the driving loop, bounds stop latency.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Consumer side of the output channel
pub type BatchReceiver = Receiver<Batch>;

/// Drives every source on one clock and publishes aligned batches.
///
/// # Example
///
/// ```ignore
/// let mut coordinator = Coordinator::new(&config, backend, sink)?;
/// coordinator.start()?;
/// while let Some(batch) = coordinator.next_batch() {
///     for record in &batch {
///         // ...
///     }
/// }
/// coordinator.stop();
/// ```
pub struct Coordinator {
    source_ids: Vec<SourceId>,
    actor_stops: Vec<Lifecycle>,
    lifecycle: Lifecycle,
    batch_rx: BatchReceiver,
    stats: Arc<CoordinatorStats>,
    /// Loop state until `start` moves it onto its thread
    pending: Option<DrivingLoop>,
    thread: Option<JoinHandle<()>>,
}

impl Coordinator {
    /// Spawn one capture actor per configured source, in order.
    ///
    /// Actors begin advancing their streams immediately; batches are produced
    /// only after [`start`](Self::start).
    #[instrument(
        name = "coordinator_new",
        skip_all,
        fields(sources = config.sources.len(), frame_rate = config.frame_rate)
    )]
    pub fn new(
        config: &CaptureConfig,
        backend: Arc<dyn StreamBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        if let Some((index, source_id)) = config.duplicate_source_id() {
            return Err(SyncError::Config(format!(
                "sources[{index}]: duplicate source_id '{source_id}'"
            )));
        }

        let settings = ActorSettings::from_config(config);
        let mut actors = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let actor = SourceActor::spawn(
                source.source_id(),
                source.address.clone(),
                backend.clone(),
                settings.clone(),
                sink.clone(),
            )?;
            actors.push(actor);
        }

        let source_ids: Vec<SourceId> = actors.iter().map(|a| a.source_id().clone()).collect();
        let actor_stops = actors.iter().map(SourceActor::stop_handle).collect();
        let (batch_tx, batch_rx) = bounded(config.output_capacity);
        let lifecycle = Lifecycle::new();
        let stats = Arc::new(CoordinatorStats::new());

        info!(
            sources = ?source_ids,
            period_ms = config.period().as_millis() as u64,
            failure_threshold = settings.failure_threshold,
            "coordinator created"
        );

        let pending = DrivingLoop {
            actors,
            source_ids: source_ids.clone(),
            pacer: Pacer::new(config.period(), config.pacing_fraction),
            collect_timeout: config.collect_timeout(),
            overflow_policy: config.overflow_policy,
            capacity: config.output_capacity,
            batch_tx,
            evict_rx: batch_rx.clone(),
            sink,
            stats: stats.clone(),
            lifecycle: lifecycle.clone(),
        };

        Ok(Self {
            source_ids,
            actor_stops,
            lifecycle,
            batch_rx,
            stats,
            pending: Some(pending),
            thread: None,
        })
    }

    /// Start the driving loop on its own thread.
    #[instrument(name = "coordinator_start", skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.lifecycle.is_stop_requested() {
            return Err(SyncError::Stopped);
        }
        let driving = self.pending.take().ok_or(SyncError::AlreadyStarted)?;

        let thread = thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || driving.run())
            .map_err(SyncError::Spawn)?;
        self.thread = Some(thread);
        Ok(())
    }

    /// Block until the next batch; `None` once stopped and drained.
    pub fn next_batch(&self) -> Option<Batch> {
        self.batch_rx.recv().ok()
    }

    /// Like [`next_batch`](Self::next_batch) with an upper bound on the wait.
    pub fn next_batch_timeout(&self, timeout: Duration) -> Option<Batch> {
        match self.batch_rx.recv_timeout(timeout) {
            Ok(batch) => Some(batch),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Receiver for a consumer running on another thread.
    pub fn batches(&self) -> BatchReceiver {
        self.batch_rx.clone()
    }

    /// Source ids in batch order
    pub fn source_ids(&self) -> &[SourceId] {
        &self.source_ids
    }

    pub fn stats(&self) -> Arc<CoordinatorStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Stop every actor and the driving loop, then wait for all threads.
    ///
    /// The loop is flagged first so that actors going away mid-cycle are
    /// read as shutdown rather than failure. Idempotent.
    #[instrument(name = "coordinator_stop", skip(self))]
    pub fn stop(&mut self) {
        self.lifecycle.request_stop();
        for stop in &self.actor_stops {
            stop.request_stop();
        }

        // Never started: dropping the loop state joins the actors.
        self.pending.take();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("coordinator thread panicked");
            }
        }
        self.lifecycle.mark_stopped();
        debug!("coordinator stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stops every actor when the driving loop exits, however it exits.
struct StopGuard {
    actor_stops: Vec<Lifecycle>,
    lifecycle: Lifecycle,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        for stop in &self.actor_stops {
            stop.request_stop();
        }
        self.lifecycle.mark_stopped();
    }
}

/// State owned by the coordinator thread.
struct DrivingLoop {
    actors: Vec<SourceActor>,
    source_ids: Vec<SourceId>,
    pacer: Pacer,
    collect_timeout: Duration,
    overflow_policy: OverflowPolicy,
    capacity: usize,
    batch_tx: Sender<Batch>,
    evict_rx: Receiver<Batch>,
    sink: Arc<dyn EventSink>,
    stats: Arc<CoordinatorStats>,
    lifecycle: Lifecycle,
}

impl DrivingLoop {
    fn run(mut self) {
        let _guard = StopGuard {
            actor_stops: self.actors.iter().map(SourceActor::stop_handle).collect(),
            lifecycle: self.lifecycle.clone(),
        };

        info!(
            period_ms = self.pacer.period().as_millis() as u64,
            collect_timeout_ms = self.collect_timeout.as_millis() as u64,
            "coordinator loop started"
        );

        let mut last_cycle: Option<Instant> = None;
        let mut sequence: u64 = 0;

        while !self.lifecycle.is_stop_requested() {
            let now = Instant::now();
            if let Some(wait) = self.pacer.time_until_due(last_cycle, now) {
                thread::sleep(wait.min(POLL_INTERVAL));
                continue;
            }

            sequence += 1;
            if let Err(e) = self.run_cycle(sequence) {
                if self.lifecycle.is_stop_requested() {
                    debug!(error = %e, "cycle interrupted by shutdown");
                } else {
                    error!(error = %e, sequence, "coordinator loop failed");
                    self.sink.report(CaptureEvent::Fatal {
                        message: e.to_string(),
                    });
                }
                break;
            }
            last_cycle = Some(now);

            let finished = Instant::now();
            histogram!("multicapture_cycle_duration_ms")
                .record(finished.saturating_duration_since(now).as_secs_f64() * 1000.0);
            gauge!("multicapture_output_queue_depth").set(self.batch_tx.len() as f64);

            match self.pacer.after_cycle(now, finished) {
                Pace::Sleep(duration) => self.sleep_unless_stopped(duration),
                Pace::Behind { elapsed } => {
                    self.stats.record_overrun();
                    self.sink.report(CaptureEvent::RateNotSustained {
                        sequence,
                        period: self.pacer.period(),
                        elapsed,
                    });
                }
            }
        }

        info!(cycles = sequence, "coordinator loop exited");
    }

    /// One cadence tick: request from all, then collect from each in order.
    fn run_cycle(&mut self, sequence: u64) -> Result<()> {
        self.stats.record_cycle();

        for actor in &mut self.actors {
            actor.request_frame();
        }

        let mut frames = Vec::with_capacity(self.actors.len());
        for actor in &mut self.actors {
            let record = match actor.take_result(self.collect_timeout) {
                Ok(record) => record,
                Err(CaptureError::Timeout { source_id, waited }) => {
                    self.stats.record_timeout();
                    self.sink.report(CaptureEvent::SourceTimeout {
                        source_id: source_id.clone(),
                        sequence,
                        waited,
                    });
                    FrameRecord::failed(source_id, FailureKind::TimedOut)
                }
                Err(e) => return Err(e.into()),
            };
            frames.push(record);
        }

        check_alignment(&self.source_ids, &frames)?;
        self.publish(Batch { sequence, frames });
        Ok(())
    }

    /// Never blocks; a full channel costs one batch.
    fn publish(&self, batch: Batch) {
        let sequence = batch.sequence;
        let rejected = match self.batch_tx.try_send(batch) {
            Ok(()) => {
                self.stats.record_published();
                trace!(sequence, "batch published");
                return;
            }
            Err(TrySendError::Full(batch)) => batch,
            Err(TrySendError::Disconnected(_)) => {
                warn!(sequence, "no batch receiver left");
                return;
            }
        };

        self.stats.record_dropped();
        let dropped = match self.overflow_policy {
            OverflowPolicy::DropNewest => DroppedBatch::Newest,
            OverflowPolicy::DropOldest => {
                let _ = self.evict_rx.try_recv();
                match self.batch_tx.try_send(rejected) {
                    Ok(()) => self.stats.record_published(),
                    // The consumer cannot have refilled the slot, only the
                    // coordinator sends; still, never retry.
                    Err(_) => debug!(sequence, "batch dropped after eviction"),
                }
                DroppedBatch::Oldest
            }
        };

        self.sink.report(CaptureEvent::OutputChannelFull {
            sequence,
            capacity: self.capacity,
            dropped,
        });
    }

    fn sleep_unless_stopped(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline || self.lifecycle.is_stop_requested() {
                return;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}

/// Entry `i` must come from source `i`.
fn check_alignment(source_ids: &[SourceId], frames: &[FrameRecord]) -> Result<()> {
    if frames.len() != source_ids.len() {
        return Err(SyncError::BatchLength {
            expected: source_ids.len(),
            actual: frames.len(),
        });
    }
    for (position, (expected, record)) in source_ids.iter().zip(frames).enumerate() {
        if record.source_id() != expected {
            return Err(SyncError::Misaligned {
                position,
                expected: expected.clone(),
                actual: record.source_id().clone(),
            });
        }
    }
    Ok(())
}
