use std::sync::atomic::{AtomicU64, Ordering};

use foundation::{clamp_frame, FrameIndex};
use tokio::sync::Notify;

/// One read of a [`PositionCell`]: the index and the write version that produced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PositionSample {
    pub index: FrameIndex,
    pub version: u32,
}

fn pack(index: FrameIndex, version: u32) -> u64 {
    (u64::from(version) << 32) | u64::from(index)
}

fn unpack(word: u64) -> PositionSample {
    PositionSample {
        index: word as u32,
        version: (word >> 32) as u32,
    }
}

/// The current frame index, shared by input handlers, the scheduler and the render loop.
///
/// Index and version live in a single atomic word so a reader can never see
/// the index of one write paired with the version of another. Writes that do
/// not move the index are dropped without bumping the version.
///
/// Every effective write leaves one wake-up permit for [`PositionCell::changed`];
/// bursts of writes collapse into a single wake-up.
#[derive(Debug)]
pub struct PositionCell {
    word: AtomicU64,
    total_frames: u32,
    changed: Notify,
}

impl PositionCell {
    pub fn new(total_frames: u32, initial: i64) -> Self {
        Self {
            word: AtomicU64::new(pack(clamp_frame(initial, total_frames), 0)),
            total_frames,
            changed: Notify::new(),
        }
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    pub fn last_frame(&self) -> FrameIndex {
        self.total_frames.saturating_sub(1)
    }

    #[inline]
    pub fn get(&self) -> FrameIndex {
        self.sample().index
    }

    #[inline]
    pub fn sample(&self) -> PositionSample {
        unpack(self.word.load(Ordering::Acquire))
    }

    /// Clamp `candidate` into the domain and store it. Returns the stored index.
    #[inline]
    pub fn set(&self, candidate: i64) -> FrameIndex {
        let total = self.total_frames;
        self.update(|_| clamp_frame(candidate, total))
    }

    /// `set(current + delta)`, applied atomically against the current value.
    #[inline]
    pub fn advance(&self, delta: i64) -> FrameIndex {
        let total = self.total_frames;
        self.update(|current| clamp_frame(i64::from(current).saturating_add(delta), total))
    }

    /// Resolves after the next effective write (or immediately if one is pending).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Wakes the waiter without writing, e.g. when loading becomes ready.
    pub fn poke(&self) {
        self.changed.notify_one();
    }

    fn update(&self, next_index: impl Fn(FrameIndex) -> FrameIndex) -> FrameIndex {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let sample = unpack(current);
            let next = next_index(sample.index);
            if next == sample.index {
                return next;
            }
            let word = pack(next, sample.version.wrapping_add(1));
            match self
                .word
                .compare_exchange_weak(current, word, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.changed.notify_one();
                    return next;
                }
                Err(actual) => current = actual,
            }
        }
    }
}
