use crate::frame::FrameIndex;

/// Inclusive range of frame indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrameRange {
    pub start: FrameIndex,
    pub end: FrameIndex,
}

impl FrameRange {
    /// Builds a range, swapping the bounds if they are reversed.
    pub fn new(start: FrameIndex, end: FrameIndex) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// `[center - radius, center + radius]` clipped to `[0, total_frames - 1]`.
    ///
    /// Returns `None` for an empty sequence.
    pub fn around(center: FrameIndex, radius: u32, total_frames: u32) -> Option<Self> {
        if total_frames == 0 {
            return None;
        }
        let last = total_frames - 1;
        let center = center.min(last);
        Some(Self {
            start: center.saturating_sub(radius),
            end: center.saturating_add(radius).min(last),
        })
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        self.start <= frame && frame <= self.end
    }

    pub fn covers(&self, other: &FrameRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &FrameRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersect(&self, other: &FrameRange) -> Option<FrameRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(FrameRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Distance from `frame` to the nearest frame inside the range (0 if inside).
    pub fn distance_to(&self, frame: FrameIndex) -> u32 {
        if frame < self.start {
            self.start - frame
        } else if frame > self.end {
            frame - self.end
        } else {
            0
        }
    }
}
