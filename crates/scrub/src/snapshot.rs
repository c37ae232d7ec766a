use std::sync::Arc;

use foundation::{frame_distance, FrameIndex, FrameRange};
use parking_lot::Mutex;
use runtime::{DragMomentumController, MomentumPhase, PositionCell, PositionSample, SnapshotSource};
use streaming::{ResolvedFrame, Streamer};

use crate::overlay::{AnnotationOverlayResolver, OverlaySpan};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    Dragging,
    Coasting,
}

impl From<MomentumPhase> for CursorState {
    fn from(phase: MomentumPhase) -> Self {
        match phase {
            MomentumPhase::Idle => CursorState::Idle,
            MomentumPhase::Dragging => CursorState::Dragging,
            MomentumPhase::Coasting => CursorState::Coasting,
        }
    }
}

/// One slot of the visible strip.
#[derive(Debug, Clone)]
pub struct VisibleFrame {
    pub index: FrameIndex,
    /// Distance from the current frame.
    pub distance: u32,
    pub opacity: f32,
    /// The exact frame, a coarser neighbour, or nothing loaded yet.
    pub resolved: Option<ResolvedFrame>,
}

/// Everything needed to draw one frame of the UI. Never mutated once published.
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    pub sequence: u64,
    pub current_frame: FrameIndex,
    pub total_frames: u32,
    pub frames: Vec<VisibleFrame>,
    pub annotations: Vec<OverlaySpan>,
    pub cursor: CursorState,
}

impl DisplaySnapshot {
    pub fn visible_range(&self) -> Option<FrameRange> {
        let first = self.frames.first()?.index;
        let last = self.frames.last()?.index;
        Some(FrameRange::new(first, last))
    }

    pub fn frame(&self, index: FrameIndex) -> Option<&VisibleFrame> {
        self.frames.iter().find(|f| f.index == index)
    }

    /// Whether every visible slot shows its own frame.
    pub fn is_sharp(&self) -> bool {
        self.frames
            .iter()
            .all(|f| f.resolved.as_ref().is_some_and(ResolvedFrame::is_exact))
    }
}

#[derive(Debug)]
pub enum SnapshotError {
    NoVisibleFrames { current: FrameIndex, total_frames: u32 },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::NoVisibleFrames { current, total_frames } => {
                write!(f, "no visible frames around {current} of {total_frames}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// What the render loop looks at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ViewFingerprint {
    pub position: PositionSample,
    pub store_revision: u64,
    pub overlay_revision: u64,
    pub cursor: CursorState,
}

/// Read-only view over the session's shared state, sampled by the render loop.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub(crate) position: Arc<PositionCell>,
    pub(crate) streamer: Arc<Streamer>,
    pub(crate) overlay: Arc<Mutex<AnnotationOverlayResolver>>,
    pub(crate) momentum: Arc<Mutex<DragMomentumController>>,
    pub(crate) visible_radius: u32,
}

impl SessionView {
    pub fn visible_range(&self, center: FrameIndex) -> Option<FrameRange> {
        FrameRange::around(center, self.visible_radius, self.position.total_frames())
    }
}

impl SnapshotSource for SessionView {
    type Fingerprint = ViewFingerprint;
    type Snapshot = DisplaySnapshot;
    type Error = SnapshotError;

    fn fingerprint(&self) -> ViewFingerprint {
        ViewFingerprint {
            position: self.position.sample(),
            store_revision: self.streamer.store_revision(),
            overlay_revision: self.overlay.lock().revision(),
            cursor: self.momentum.lock().phase().into(),
        }
    }

    fn build_snapshot(&self, sequence: u64) -> Result<DisplaySnapshot, SnapshotError> {
        let current = self.position.get();
        let total_frames = self.position.total_frames();
        let visible = self
            .visible_range(current)
            .ok_or(SnapshotError::NoVisibleFrames { current, total_frames })?;

        let (cursor, fade) = {
            let momentum = self.momentum.lock();
            (CursorState::from(momentum.phase()), momentum.config().clone())
        };

        let frames = self
            .streamer
            .resolve_range(visible)
            .into_iter()
            .map(|(index, resolved)| {
                let distance = frame_distance(index, current);
                VisibleFrame {
                    index,
                    distance,
                    opacity: fade.opacity(distance),
                    resolved,
                }
            })
            .collect();

        Ok(DisplaySnapshot {
            sequence,
            current_frame: current,
            total_frames,
            frames,
            annotations: self.overlay.lock().overlay(visible),
            cursor,
        })
    }
}
