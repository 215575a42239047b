//! Mock stream backend
//!
//! Implements `StreamBackend` with per-address knobs that tests flip at
//! runtime: make opens fail, make advances fail, slow down materialization.
//! Counters record what the actors actually did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use contracts::{ContractError, ImageData, ImageFormat, StreamBackend, StreamConnection};
use tracing::trace;

const MOCK_WIDTH: u32 = 8;
const MOCK_HEIGHT: u32 = 8;

/// Runtime knobs and counters for one mock address
#[derive(Debug)]
pub struct MockControl {
    open_ok: AtomicBool,
    advance_ok: AtomicBool,
    materialize_ok: AtomicBool,
    advance_delay_us: AtomicU64,
    materialize_delay_us: AtomicU64,

    opens: AtomicU64,
    advances: AtomicU64,
    failed_advances: AtomicU64,
    materializations: AtomicU64,
    live_connections: AtomicI64,
}

impl Default for MockControl {
    fn default() -> Self {
        Self {
            open_ok: AtomicBool::new(true),
            advance_ok: AtomicBool::new(true),
            materialize_ok: AtomicBool::new(true),
            // Roughly a 1 kHz stream, keeps healthy actors from spinning.
            advance_delay_us: AtomicU64::new(1_000),
            materialize_delay_us: AtomicU64::new(0),
            opens: AtomicU64::new(0),
            advances: AtomicU64::new(0),
            failed_advances: AtomicU64::new(0),
            materializations: AtomicU64::new(0),
            live_connections: AtomicI64::new(0),
        }
    }
}

impl MockControl {
    pub fn set_open_ok(&self, ok: bool) {
        self.open_ok.store(ok, Ordering::SeqCst);
    }

    /// Affects existing connections too.
    pub fn set_advance_ok(&self, ok: bool) {
        self.advance_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_materialize_ok(&self, ok: bool) {
        self.materialize_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_advance_delay(&self, delay: Duration) {
        self.advance_delay_us
            .store(delay.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn set_materialize_delay(&self, delay: Duration) {
        self.materialize_delay_us
            .store(delay.as_micros() as u64, Ordering::SeqCst);
    }

    /// Open attempts, successful or not
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn advances(&self) -> u64 {
        self.advances.load(Ordering::SeqCst)
    }

    pub fn failed_advances(&self) -> u64 {
        self.failed_advances.load(Ordering::SeqCst)
    }

    pub fn materializations(&self) -> u64 {
        self.materializations.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed
    pub fn live_connections(&self) -> i64 {
        self.live_connections.load(Ordering::SeqCst)
    }

    fn delay(value: &AtomicU64) {
        let us = value.load(Ordering::SeqCst);
        if us > 0 {
            thread::sleep(Duration::from_micros(us));
        }
    }
}

/// Scriptable in-memory backend.
///
/// Every address gets its own [`MockControl`], created on first use.
#[derive(Debug, Default)]
pub struct MockBackend {
    controls: Mutex<HashMap<String, Arc<MockControl>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Control block for `address`.
    pub fn control(&self, address: &str) -> Arc<MockControl> {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_string())
            .or_default()
            .clone()
    }
}

impl StreamBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, address: &str) -> Result<Box<dyn StreamConnection>, ContractError> {
        let control = self.control(address);
        control.opens.fetch_add(1, Ordering::SeqCst);

        if !control.open_ok.load(Ordering::SeqCst) {
            return Err(ContractError::stream_open(address, "mock open refused"));
        }

        control.live_connections.fetch_add(1, Ordering::SeqCst);
        trace!(address, "mock connection opened");
        Ok(Box::new(MockConnection {
            control,
            frame: 0,
            closed: false,
        }))
    }
}

struct MockConnection {
    control: Arc<MockControl>,
    frame: u64,
    closed: bool,
}

impl StreamConnection for MockConnection {
    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        MockControl::delay(&self.control.advance_delay_us);
        self.control.advances.fetch_add(1, Ordering::SeqCst);

        if self.control.advance_ok.load(Ordering::SeqCst) {
            self.frame += 1;
            true
        } else {
            self.control.failed_advances.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    fn materialize(&mut self) -> Option<ImageData> {
        if self.closed {
            return None;
        }
        MockControl::delay(&self.control.materialize_delay_us);
        self.control.materializations.fetch_add(1, Ordering::SeqCst);

        if !self.control.materialize_ok.load(Ordering::SeqCst) {
            return None;
        }
        // First byte carries the frame counter so tests can tell frames apart.
        let mut data = vec![0u8; (MOCK_WIDTH * MOCK_HEIGHT) as usize];
        data[0] = self.frame as u8;
        Some(ImageData {
            width: MOCK_WIDTH,
            height: MOCK_HEIGHT,
            format: ImageFormat::Gray8,
            data: Bytes::from(data),
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.control.live_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.close();
    }
}
