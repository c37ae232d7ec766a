/// Zero-based position of a still within the extracted frame sequence.
pub type FrameIndex = u32;

/// Clamp a signed candidate position into `[0, total_frames - 1]`.
///
/// An empty sequence clamps everything to 0.
pub fn clamp_frame(candidate: i64, total_frames: u32) -> FrameIndex {
    if total_frames == 0 {
        return 0;
    }
    candidate.clamp(0, i64::from(total_frames) - 1) as FrameIndex
}

/// Absolute distance between two frames.
pub fn frame_distance(a: FrameIndex, b: FrameIndex) -> u32 {
    a.abs_diff(b)
}

/// Round `frame` to the nearest multiple of `modulo`, staying below `total_frames`.
///
/// Ties round up. If the rounded value falls past the last frame, the
/// multiple below is used instead.
pub fn round_to_multiple(frame: FrameIndex, modulo: u32, total_frames: u32) -> Option<FrameIndex> {
    if modulo == 0 || total_frames == 0 {
        return None;
    }
    let below = frame - frame % modulo;
    let above = u64::from(below) + u64::from(modulo);
    let nearest = if frame - below >= modulo - (frame - below) && above < u64::from(total_frames) {
        above as u32
    } else {
        below
    };
    (nearest < total_frames).then_some(nearest)
}

#[cfg(test)]
mod tests {
    use super::{clamp_frame, frame_distance, round_to_multiple};

    #[test]
    fn clamps_into_domain() {
        assert_eq!(clamp_frame(-5, 100), 0);
        assert_eq!(clamp_frame(42, 100), 42);
        assert_eq!(clamp_frame(1_000, 100), 99);
        assert_eq!(clamp_frame(7, 0), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        assert_eq!(frame_distance(3, 10), 7);
        assert_eq!(frame_distance(10, 3), 7);
    }

    #[test]
    fn rounds_to_nearest_multiple() {
        assert_eq!(round_to_multiple(47, 32, 1000), Some(32));
        assert_eq!(round_to_multiple(48, 32, 1000), Some(64));
        assert_eq!(round_to_multiple(64, 32, 1000), Some(64));
        assert_eq!(round_to_multiple(5, 1, 1000), Some(5));
    }

    #[test]
    fn rounding_past_the_end_falls_back_below() {
        // 990 rounds up to 992 normally, but the sequence ends at 991.
        assert_eq!(round_to_multiple(990, 32, 992), Some(960));
        assert_eq!(round_to_multiple(990, 32, 1000), Some(992));
    }
}
