//! FrameRecord / Batch - Coordinator output
//!
//! One record per source per cycle; a batch is the positionally aligned set of
//! records for a single cadence tick.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::SourceId;

/// Decoded image handed back by a stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Pixel layout
    pub format: ImageFormat,

    /// Raw pixel data, shared without copying
    pub data: Bytes,
}

impl ImageData {
    /// Expected byte length for the declared dimensions and format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Pixel layout of an `ImageData`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Gray8,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }
}

/// Why a record carries no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The last advance or the materialize step failed
    ReadFailed,
    /// The source has no open connection
    Disconnected,
    /// The actor did not answer within the collection timeout
    TimedOut,
}

/// Result of one capture request for one source.
///
/// `payload` is present exactly when the capture succeeded; the constructors
/// are the only way to build a record, and deserialization goes through the
/// same check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawFrameRecord")]
pub struct FrameRecord {
    source_id: SourceId,
    payload: Option<ImageData>,
    failure: Option<FailureKind>,
}

impl FrameRecord {
    pub fn captured(source_id: SourceId, image: ImageData) -> Self {
        Self {
            source_id,
            payload: Some(image),
            failure: None,
        }
    }

    pub fn failed(source_id: SourceId, kind: FailureKind) -> Self {
        Self {
            source_id,
            payload: None,
            failure: Some(kind),
        }
    }

    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn payload(&self) -> Option<&ImageData> {
        self.payload.as_ref()
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// `None` for successful records.
    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }
}

#[derive(Deserialize)]
struct RawFrameRecord {
    source_id: SourceId,
    payload: Option<ImageData>,
    failure: Option<FailureKind>,
}

impl TryFrom<RawFrameRecord> for FrameRecord {
    type Error = String;

    fn try_from(raw: RawFrameRecord) -> Result<Self, Self::Error> {
        match (raw.payload, raw.failure) {
            (Some(image), None) => Ok(Self::captured(raw.source_id, image)),
            (None, Some(kind)) => Ok(Self::failed(raw.source_id, kind)),
            (Some(_), Some(_)) => Err(format!(
                "record for '{}' has both a payload and a failure",
                raw.source_id
            )),
            (None, None) => Err(format!(
                "record for '{}' has neither a payload nor a failure",
                raw.source_id
            )),
        }
    }
}

/// Aligned set of records for one cadence tick.
///
/// `frames[i]` always belongs to the i-th registered source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Cycle number (monotonically increasing, gaps mean dropped batches)
    pub sequence: u64,

    /// One record per source, in registration order
    pub frames: Vec<FrameRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.frames.iter()
    }

    /// Number of entries that carry a frame.
    pub fn success_count(&self) -> usize {
        self.frames.iter().filter(|f| f.success()).count()
    }

    /// Sources that produced no frame this cycle.
    pub fn missing_sources(&self) -> Vec<SourceId> {
        self.frames
            .iter()
            .filter(|f| !f.success())
            .map(|f| f.source_id().clone())
            .collect()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a FrameRecord;
    type IntoIter = std::slice::Iter<'a, FrameRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}
