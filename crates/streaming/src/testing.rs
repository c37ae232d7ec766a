//! In-memory [`FrameSource`] for tests and offline demos.
//!
//! Every still is a solid-colour PNG whose RGB channels carry its frame index,
//! so a decoded image can be traced back to the frame it came from.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use foundation::{FrameIndex, FrameRange};
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::decode::DecodedFrame;
use crate::protocol::{Annotation, EncodedFrame, VideoMetadata};
use crate::source::{BoxFuture, FrameSource, SourceError};

#[derive(Debug, Default)]
struct Faults {
    failing: HashSet<FrameIndex>,
    dropped: HashSet<FrameIndex>,
    corrupt: HashSet<FrameIndex>,
}

#[derive(Debug)]
pub struct MemorySource {
    metadata: VideoMetadata,
    annotations: Mutex<Vec<Annotation>>,
    metadata_fails: bool,
    annotations_fail: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    faults: Mutex<Faults>,
    requests: Mutex<Vec<Vec<FrameIndex>>>,
    annotation_requests: Mutex<Vec<FrameRange>>,
}

impl MemorySource {
    pub fn new(total_frames: u32, width: u32, height: u32) -> Self {
        Self {
            metadata: VideoMetadata {
                total_frames,
                width: width.max(1),
                height: height.max(1),
            },
            annotations: Mutex::new(Vec::new()),
            metadata_fails: false,
            annotations_fail: AtomicBool::new(false),
            gate: None,
            faults: Mutex::new(Faults::default()),
            requests: Mutex::new(Vec::new()),
            annotation_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_annotations(self, annotations: Vec<Annotation>) -> Self {
        *self.annotations.lock() = annotations;
        self
    }

    /// `metadata()` always errors.
    pub fn failing_metadata(mut self) -> Self {
        self.metadata_fails = true;
        self
    }

    /// Frame fetches wait for [`MemorySource::release`] before answering.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets `n` gated fetches through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Any batch containing `frame` fails as a whole.
    pub fn fail_frame(&self, frame: FrameIndex) {
        self.faults.lock().failing.insert(frame);
    }

    /// `frame` is silently left out of responses.
    pub fn drop_frame(&self, frame: FrameIndex) {
        self.faults.lock().dropped.insert(frame);
    }

    /// `frame` is answered with bytes that are not an image.
    pub fn corrupt_frame(&self, frame: FrameIndex) {
        self.faults.lock().corrupt.insert(frame);
    }

    pub fn clear_failures(&self) {
        *self.faults.lock() = Faults::default();
    }

    pub fn set_annotations(&self, annotations: Vec<Annotation>) {
        *self.annotations.lock() = annotations;
    }

    pub fn fail_annotations(&self, fail: bool) {
        self.annotations_fail.store(fail, Ordering::Release);
    }

    /// Every frame batch requested so far, in order.
    pub fn requests(&self) -> Vec<Vec<FrameIndex>> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn annotation_requests(&self) -> Vec<FrameRange> {
        self.annotation_requests.lock().clone()
    }

    fn answer(&self, indices: &[FrameIndex]) -> Result<Vec<EncodedFrame>, SourceError> {
        let faults = self.faults.lock();
        if let Some(frame) = indices.iter().find(|i| faults.failing.contains(*i)) {
            return Err(SourceError::new(format!("injected failure for frame {frame}")));
        }

        let mut frames = Vec::with_capacity(indices.len());
        for &frame_index in indices {
            if frame_index >= self.metadata.total_frames || faults.dropped.contains(&frame_index) {
                continue;
            }
            let bytes = if faults.corrupt.contains(&frame_index) {
                b"not an image".to_vec()
            } else {
                encode_still(frame_index, self.metadata.width, self.metadata.height)?
            };
            frames.push(EncodedFrame { frame_index, bytes });
        }
        Ok(frames)
    }
}

impl FrameSource for MemorySource {
    fn metadata(&self) -> BoxFuture<'_, Result<VideoMetadata, SourceError>> {
        Box::pin(async move {
            if self.metadata_fails {
                return Err(SourceError::new("metadata unavailable"));
            }
            Ok(self.metadata)
        })
    }

    fn fetch_frames(&self, indices: Vec<FrameIndex>) -> BoxFuture<'_, Result<Vec<EncodedFrame>, SourceError>> {
        Box::pin(async move {
            self.requests.lock().push(indices.clone());
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| SourceError::with_source("gate closed", e))?
                    .forget();
            }
            self.answer(&indices)
        })
    }

    fn fetch_annotations(&self, range: FrameRange) -> BoxFuture<'_, Result<Vec<Annotation>, SourceError>> {
        Box::pin(async move {
            self.annotation_requests.lock().push(range);
            if self.annotations_fail.load(Ordering::Acquire) {
                return Err(SourceError::new("annotation service unavailable"));
            }
            Ok(self
                .annotations
                .lock()
                .iter()
                .filter(|a| a.range().overlaps(&range))
                .cloned()
                .collect())
        })
    }
}

/// PNG still whose pixels spell out `frame_index`.
pub fn encode_still(frame_index: FrameIndex, width: u32, height: u32) -> Result<Vec<u8>, SourceError> {
    let [r, g, b, _] = frame_index.to_le_bytes();
    let image = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| SourceError::with_source("png encode failed", e))?;
    Ok(bytes)
}

/// Reads back the index written by [`encode_still`].
pub fn still_index(image: &DecodedFrame) -> FrameIndex {
    let [r, g, b, _] = image.pixel(0, 0).unwrap_or_default();
    u32::from_le_bytes([r, g, b, 0])
}

/// Annotation spanning `start..=end`.
pub fn annotation(id: u64, start: FrameIndex, end: FrameIndex, state: &str) -> Annotation {
    Annotation {
        id,
        start_frame: start,
        end_frame: end,
        state: state.to_string(),
        pending: false,
    }
}
