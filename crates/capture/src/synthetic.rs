//! Synthetic test-pattern streams (`synthetic://` addresses)
//!
//! Stands in for a real decoder when running the pipeline without cameras.
//! `advance` blocks until the next frame tick, the way a network grab waits
//! for the next packet, and `materialize` renders a moving gradient.
//!
//! Address syntax: `synthetic://<name>[?key=value&...]`
//!
//! | key          | meaning                                      | default |
//! |--------------|----------------------------------------------|---------|
//! | `width`      | frame width                                  | 320     |
//! | `height`     | frame height                                 | 240     |
//! | `fps`        | source frame rate                            | 25      |
//! | `fail_after` | advances that succeed before the stream dies | never   |
//! | `offline`    | `true` to refuse every open                  | false   |

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{ContractError, ImageData, ImageFormat, StreamBackend, StreamConnection};
use tracing::debug;

const SCHEME: &str = "synthetic://";

/// Slowest accepted stream: one frame per hour.
const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Parsed `synthetic://` address
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub fail_after: Option<u64>,
    pub offline: bool,
}

impl SyntheticSpec {
    pub fn parse(address: &str) -> Result<Self, ContractError> {
        let rest = address
            .strip_prefix(SCHEME)
            .ok_or_else(|| ContractError::UnsupportedAddress {
                address: address.to_string(),
            })?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut spec = Self {
            name: name.to_string(),
            width: 320,
            height: 240,
            fps: 25.0,
            fail_after: None,
            offline: false,
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(address, format!("expected key=value, got '{pair}'")))?;
            let bad_value = || invalid(address, format!("bad value for '{key}': '{value}'"));
            match key {
                "width" => spec.width = value.parse().map_err(|_| bad_value())?,
                "height" => spec.height = value.parse().map_err(|_| bad_value())?,
                "fps" => spec.fps = value.parse().map_err(|_| bad_value())?,
                "fail_after" => spec.fail_after = Some(value.parse().map_err(|_| bad_value())?),
                "offline" => spec.offline = value.parse().map_err(|_| bad_value())?,
                _ => return Err(invalid(address, format!("unknown parameter '{key}'"))),
            }
        }

        if spec.width == 0 || spec.height == 0 || !spec.fps.is_finite() || spec.fps <= 0.0 {
            return Err(invalid(address, "width, height and fps must be positive and finite"));
        }
        match Duration::try_from_secs_f64(1.0 / spec.fps) {
            Ok(interval) if interval <= MAX_INTERVAL => Ok(spec),
            _ => Err(invalid(
                address,
                format!("fps {} is below one frame per {}s", spec.fps, MAX_INTERVAL.as_secs()),
            )),
        }
    }

    /// Time between two frames; bounded by `parse`.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.fps)
            .unwrap_or(MAX_INTERVAL)
            .min(MAX_INTERVAL)
    }
}

fn invalid(address: &str, message: impl Into<String>) -> ContractError {
    ContractError::stream_open(address, message)
}

/// Backend serving `synthetic://` addresses; anything else fails to open.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticBackend;

impl SyntheticBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StreamBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&self, address: &str) -> Result<Box<dyn StreamConnection>, ContractError> {
        let spec = SyntheticSpec::parse(address)?;
        if spec.offline {
            return Err(ContractError::stream_open(address, "source offline"));
        }
        debug!(name = %spec.name, width = spec.width, height = spec.height, fps = spec.fps, "synthetic stream opened");

        let interval = spec.interval();
        Ok(Box::new(SyntheticConnection {
            spec,
            interval,
            next_tick: Instant::now(),
            frame: 0,
            closed: false,
        }))
    }
}

struct SyntheticConnection {
    spec: SyntheticSpec,
    interval: Duration,
    next_tick: Instant,
    frame: u64,
    closed: bool,
}

impl StreamConnection for SyntheticConnection {
    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }

        let now = Instant::now();
        if self.next_tick > now {
            thread::sleep(self.next_tick - now);
        }
        // A reader that fell behind resumes from now instead of bursting.
        self.next_tick = match self.next_tick.checked_add(self.interval) {
            Some(next) => next.max(now),
            None => return false,
        };

        match self.spec.fail_after {
            Some(limit) if self.frame >= limit => false,
            _ => {
                self.frame += 1;
                true
            }
        }
    }

    fn materialize(&mut self) -> Option<ImageData> {
        if self.closed || self.frame == 0 {
            return None;
        }
        let (width, height) = (self.spec.width as usize, self.spec.height as usize);
        let shift = self.frame as usize;
        let data: Vec<u8> = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + y + shift) % 256) as u8))
            .collect();

        Some(ImageData {
            width: self.spec.width,
            height: self.spec.height,
            format: ImageFormat::Gray8,
            data: Bytes::from(data),
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
