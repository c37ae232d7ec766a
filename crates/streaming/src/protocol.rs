//! Types exchanged with the frame service.
//!
//! - Metadata: total frame count and still dimensions, fetched once per session.
//! - Frame batches: an explicit list of indices in, encoded stills out.
//! - Annotations: records overlapping an inclusive frame range, read-only here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use foundation::{FrameIndex, FrameRange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub total_frames: u32,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// Width over height, if both are known.
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0 && self.height > 0).then(|| f64::from(self.width) / f64::from(self.height))
    }
}

/// One still as delivered by the service, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub frame_index: FrameIndex,
    pub bytes: Vec<u8>,
}

/// An annotation record owned by the annotation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub state: String,
    /// Saved locally but not yet confirmed by the service.
    #[serde(default)]
    pub pending: bool,
}

impl Annotation {
    pub fn range(&self) -> FrameRange {
        FrameRange::new(self.start_frame, self.end_frame)
    }
}

/// Body of a frame-batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramesRequest {
    pub indices: Vec<FrameIndex>,
}

/// One entry of a frame-batch response; `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    pub frame_index: FrameIndex,
    pub data: String,
}

impl WireFrame {
    pub fn encode(frame: &EncodedFrame) -> Self {
        Self {
            frame_index: frame.frame_index,
            data: STANDARD.encode(&frame.bytes),
        }
    }

    pub fn decode(self) -> Result<EncodedFrame, base64::DecodeError> {
        Ok(EncodedFrame {
            frame_index: self.frame_index,
            bytes: STANDARD.decode(self.data.as_bytes())?,
        })
    }
}
