//! Source actor
//!
//! One thread per source. The thread keeps advancing its stream so the
//! decoder never falls behind, and only materializes a frame when the
//! coordinator asks for one. Requests and results travel through two
//! single-slot channels tagged with a ticket, so a result that arrives after
//! its request timed out is never mistaken for the answer to a later one.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    CaptureConfig, CaptureEvent, EventSink, FailureKind, FrameRecord, Lifecycle, LifecycleState,
    SourceId, StreamBackend, StreamConnection,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{CaptureError, Result};
use crate::policy::ReconnectPolicy;

/// Upper bound on how long an idle actor goes without checking for stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Per-actor tuning
#[derive(Debug, Clone)]
pub struct ActorSettings {
    /// Consecutive failed advances before reconnecting
    pub failure_threshold: u32,
    /// Minimum interval between reconnection attempts
    pub reconnect_cooldown: Duration,
    /// Wait after a failed advance, interrupted by incoming requests
    pub failure_backoff: Duration,
}

impl ActorSettings {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold(),
            reconnect_cooldown: config.reconnect_cooldown(),
            failure_backoff: config.failure_backoff(),
        }
    }
}

type Outbox = (u64, FrameRecord);

/// Handle on a running capture thread.
///
/// At most one request may be outstanding: call [`request_frame`] and then
/// [`take_result`] exactly once before the next request.
///
/// [`request_frame`]: SourceActor::request_frame
/// [`take_result`]: SourceActor::take_result
pub struct SourceActor {
    source_id: SourceId,
    trigger_tx: Sender<u64>,
    // Kept to withdraw a ticket the worker has not picked up yet.
    trigger_rx: Receiver<u64>,
    outbox_rx: Receiver<Outbox>,
    next_ticket: u64,
    outstanding: Option<u64>,
    lifecycle: Lifecycle,
    thread: Option<JoinHandle<()>>,
}

impl SourceActor {
    /// Start the capture thread for one source.
    ///
    /// The connection is opened on the new thread; an address that cannot be
    /// opened is not an error here, the actor keeps retrying in the background.
    #[instrument(
        name = "source_actor_spawn",
        skip_all,
        fields(source_id = %source_id, backend = backend.name())
    )]
    pub fn spawn(
        source_id: SourceId,
        address: impl Into<String>,
        backend: Arc<dyn StreamBackend>,
        settings: ActorSettings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let (trigger_tx, trigger_rx) = bounded(1);
        let (outbox_tx, outbox_rx) = bounded(1);
        let lifecycle = Lifecycle::new();

        let worker = Worker {
            source_id: source_id.clone(),
            address: address.into(),
            backend,
            sink,
            connection: None,
            policy: ReconnectPolicy::new(settings.failure_threshold, settings.reconnect_cooldown),
            failure_backoff: settings.failure_backoff,
            last_advance_ok: false,
            trigger_rx: trigger_rx.clone(),
            outbox_tx,
            outbox_evict: outbox_rx.clone(),
            lifecycle: lifecycle.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("capture:{source_id}"))
            .spawn(move || worker.run())
            .map_err(|source| CaptureError::Spawn {
                source_id: source_id.clone(),
                source,
            })?;

        Ok(Self {
            source_id,
            trigger_tx,
            trigger_rx,
            outbox_rx,
            next_ticket: 0,
            outstanding: None,
            lifecycle,
            thread: Some(thread),
        })
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// Ask the actor for its latest frame. Never blocks.
    pub fn request_frame(&mut self) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        if let Ok(stale) = self.trigger_rx.try_recv() {
            trace!(source_id = %self.source_id, stale, "withdrew unserviced request");
        }
        if let Err(TrySendError::Disconnected(_)) = self.trigger_tx.try_send(ticket) {
            debug!(source_id = %self.source_id, "request sent to stopped actor");
        }
        self.outstanding = Some(ticket);
    }

    /// Wait up to `timeout` for the answer to the outstanding request.
    ///
    /// # Errors
    /// - `Timeout` when nothing matching arrived in time (the request is then
    ///   abandoned; a late answer is discarded by the next call)
    /// - `Disconnected` when the capture thread has exited
    /// - `NoPendingRequest` when called without a preceding `request_frame`
    pub fn take_result(&mut self, timeout: Duration) -> Result<FrameRecord> {
        let ticket = self
            .outstanding
            .take()
            .ok_or_else(|| CaptureError::NoPendingRequest {
                source_id: self.source_id.clone(),
            })?;

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            match self.outbox_rx.recv_deadline(deadline) {
                Ok((answered, record)) if answered == ticket => return Ok(record),
                Ok((answered, _)) => {
                    trace!(source_id = %self.source_id, answered, ticket, "discarded stale result");
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CaptureError::Timeout {
                        source_id: self.source_id.clone(),
                        waited: started.elapsed(),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::Disconnected {
                        source_id: self.source_id.clone(),
                    })
                }
            }
        }
    }

    /// Request termination. Idempotent, does not wait for the thread.
    pub fn stop(&self) {
        self.lifecycle.request_stop();
    }

    /// Handle that can stop this actor from another thread.
    pub fn stop_handle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

impl Drop for SourceActor {
    fn drop(&mut self) {
        self.lifecycle.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(source_id = %self.source_id, "capture thread panicked");
            }
        }
    }
}

/// State owned by the capture thread.
struct Worker {
    source_id: SourceId,
    address: String,
    backend: Arc<dyn StreamBackend>,
    sink: Arc<dyn EventSink>,
    connection: Option<Box<dyn StreamConnection>>,
    policy: ReconnectPolicy,
    failure_backoff: Duration,
    last_advance_ok: bool,
    trigger_rx: Receiver<u64>,
    outbox_tx: Sender<Outbox>,
    outbox_evict: Receiver<Outbox>,
    lifecycle: Lifecycle,
}

impl Worker {
    fn run(mut self) {
        debug!(
            source_id = %self.source_id,
            threshold = self.policy.threshold(),
            cooldown_ms = self.policy.cooldown().as_millis() as u64,
            "capture actor started"
        );
        self.open_initial();

        while !self.lifecycle.is_stop_requested() {
            if let Ok(ticket) = self.trigger_rx.try_recv() {
                self.service(ticket);
            }

            let advanced = self.advance();

            let now = Instant::now();
            if self.policy.should_reconnect(now) {
                self.reconnect(now);
            }

            if !advanced {
                self.idle(self.failure_backoff);
            }
        }

        debug!(source_id = %self.source_id, "capture actor stopped");
    }

    fn open_initial(&mut self) {
        match self.backend.open(&self.address) {
            Ok(connection) => {
                info!(source_id = %self.source_id, "stream opened");
                self.connection = Some(connection);
            }
            Err(e) => {
                self.policy.mark_disconnected();
                self.policy.record_attempt(Instant::now());
                self.sink.report(CaptureEvent::ReconnectionFailed {
                    source_id: self.source_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Answer one request with whatever the connection holds right now.
    fn service(&mut self, ticket: u64) {
        let record = match self.connection.as_mut() {
            None => FrameRecord::failed(self.source_id.clone(), FailureKind::Disconnected),
            Some(_) if !self.last_advance_ok => {
                FrameRecord::failed(self.source_id.clone(), FailureKind::ReadFailed)
            }
            Some(connection) => match connection.materialize() {
                Some(image) => FrameRecord::captured(self.source_id.clone(), image),
                None => FrameRecord::failed(self.source_id.clone(), FailureKind::ReadFailed),
            },
        };
        trace!(source_id = %self.source_id, ticket, success = record.success(), "request serviced");
        self.deposit((ticket, record));
    }

    /// Put a result in the outbox, replacing one the coordinator gave up on.
    fn deposit(&self, mut message: Outbox) {
        loop {
            match self.outbox_tx.try_send(message) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    let _ = self.outbox_evict.try_recv();
                    message = returned;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn advance(&mut self) -> bool {
        let ok = self
            .connection
            .as_mut()
            .map(|connection| connection.advance())
            .unwrap_or(false);
        self.last_advance_ok = ok;

        if ok {
            self.policy.record_success();
        } else if self.policy.record_failure() {
            self.sink.report(CaptureEvent::ConnectionLost {
                source_id: self.source_id.clone(),
                consecutive_failures: self.policy.consecutive_failures(),
            });
        }
        ok
    }

    fn reconnect(&mut self, now: Instant) {
        info!(
            source_id = %self.source_id,
            consecutive_failures = self.policy.consecutive_failures(),
            "reconnecting"
        );
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.policy.record_attempt(now);

        match self.backend.open(&self.address) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.sink.report(CaptureEvent::Reconnected {
                    source_id: self.source_id.clone(),
                });
            }
            Err(e) => {
                self.sink.report(CaptureEvent::ReconnectionFailed {
                    source_id: self.source_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Sleep for `backoff`, still answering requests and watching for stop.
    fn idle(&mut self, backoff: Duration) {
        let deadline = Instant::now() + backoff;
        while !self.lifecycle.is_stop_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.trigger_rx.recv_deadline((now + STOP_POLL_INTERVAL).min(deadline)) {
                Ok(ticket) => self.service(ticket),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.lifecycle.mark_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use contracts::NullSink;

    const WAIT: Duration = Duration::from_millis(500);

    fn settings(threshold: u32, cooldown_ms: u64) -> ActorSettings {
        ActorSettings {
            failure_threshold: threshold,
            reconnect_cooldown: Duration::from_millis(cooldown_ms),
            failure_backoff: Duration::from_millis(2),
        }
    }

    fn poll_until(mut actor: SourceActor, deadline: Duration) -> (SourceActor, bool) {
        let start = Instant::now();
        while start.elapsed() < deadline {
            actor.request_frame();
            if let Ok(record) = actor.take_result(WAIT) {
                if record.success() {
                    return (actor, true);
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        (actor, false)
    }

    #[test]
    fn test_healthy_source_returns_frames() {
        let backend = Arc::new(MockBackend::new());
        let mut actor = SourceActor::spawn(
            "cam".into(),
            "cam",
            backend.clone(),
            settings(10, 1000),
            Arc::new(NullSink),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        actor.request_frame();
        let record = actor.take_result(WAIT).unwrap();
        assert!(record.success());
        assert_eq!(record.source_id(), "cam");
        assert!(record.payload().is_some());
        assert!(backend.control("cam").advances() > 0);
    }

    #[test]
    fn test_take_result_without_request() {
        let backend = Arc::new(MockBackend::new());
        let mut actor =
            SourceActor::spawn("cam".into(), "cam", backend, settings(10, 1000), Arc::new(NullSink))
                .unwrap();
        assert!(matches!(
            actor.take_result(Duration::from_millis(10)),
            Err(CaptureError::NoPendingRequest { .. })
        ));
    }

    #[test]
    fn test_stuck_source_times_out_and_late_answer_is_discarded() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control("slow");
        control.set_materialize_delay(Duration::from_millis(150));

        let mut actor = SourceActor::spawn(
            "slow".into(),
            "slow",
            backend.clone(),
            settings(10, 1000),
            Arc::new(NullSink),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        actor.request_frame();
        let err = actor.take_result(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, CaptureError::Timeout { .. }));

        // The late answer to the first request must not satisfy the second.
        control.set_materialize_delay(Duration::ZERO);
        thread::sleep(Duration::from_millis(200));
        let before = control.materializations();
        actor.request_frame();
        let record = actor.take_result(WAIT).unwrap();
        assert!(record.success());
        assert!(control.materializations() > before);
    }

    #[test]
    fn test_failed_initial_open_recovers_without_restart() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control("flaky");
        control.set_open_ok(false);

        let mut actor = SourceActor::spawn(
            "flaky".into(),
            "flaky",
            backend.clone(),
            settings(3, 50),
            Arc::new(NullSink),
        )
        .unwrap();

        actor.request_frame();
        let record = actor.take_result(WAIT).unwrap();
        assert_eq!(record.failure(), Some(FailureKind::Disconnected));

        control.set_open_ok(true);
        let (_actor, recovered) = poll_until(actor, Duration::from_secs(3));
        assert!(recovered);
        assert!(control.opens() >= 2);
    }

    #[test]
    fn test_stop_is_idempotent_and_releases_connection() {
        let backend = Arc::new(MockBackend::new());
        let actor = SourceActor::spawn(
            "cam".into(),
            "cam",
            backend.clone(),
            settings(10, 1000),
            Arc::new(NullSink),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        actor.stop();
        actor.stop();
        let handle = actor.stop_handle();
        drop(actor);

        assert_eq!(handle.state(), LifecycleState::Stopped);
        assert_eq!(backend.control("cam").live_connections(), 0);
    }
}
