use std::sync::atomic::{AtomicU64, Ordering};

/// Named counters kept by the streamer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamCounter {
    GenerationsStarted,
    GenerationsCompleted,
    GenerationsSuperseded,
    BatchesIssued,
    ChunksRequested,
    ChunksLoaded,
    ChunksFailed,
    ChunksEvicted,
    FramesInstalled,
    FramesUpgraded,
    FramesReleased,
    DecodeFailures,
}

impl StreamCounter {
    pub const ALL: [StreamCounter; 12] = [
        StreamCounter::GenerationsStarted,
        StreamCounter::GenerationsCompleted,
        StreamCounter::GenerationsSuperseded,
        StreamCounter::BatchesIssued,
        StreamCounter::ChunksRequested,
        StreamCounter::ChunksLoaded,
        StreamCounter::ChunksFailed,
        StreamCounter::ChunksEvicted,
        StreamCounter::FramesInstalled,
        StreamCounter::FramesUpgraded,
        StreamCounter::FramesReleased,
        StreamCounter::DecodeFailures,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StreamCounter::GenerationsStarted => "generations_started",
            StreamCounter::GenerationsCompleted => "generations_completed",
            StreamCounter::GenerationsSuperseded => "generations_superseded",
            StreamCounter::BatchesIssued => "batches_issued",
            StreamCounter::ChunksRequested => "chunks_requested",
            StreamCounter::ChunksLoaded => "chunks_loaded",
            StreamCounter::ChunksFailed => "chunks_failed",
            StreamCounter::ChunksEvicted => "chunks_evicted",
            StreamCounter::FramesInstalled => "frames_installed",
            StreamCounter::FramesUpgraded => "frames_upgraded",
            StreamCounter::FramesReleased => "frames_released",
            StreamCounter::DecodeFailures => "decode_failures",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Lock-free counters, safe to bump from any task.
#[derive(Debug, Default)]
pub struct StreamStats {
    counters: [AtomicU64; StreamCounter::ALL.len()],
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, counter: StreamCounter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: StreamCounter, by: u64) {
        self.counters[counter.slot()].fetch_add(by, Ordering::Relaxed);
    }

    pub fn get(&self, counter: StreamCounter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    /// All counters sorted by name, suitable for logs and debug overlays.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut out: Vec<_> = StreamCounter::ALL
            .iter()
            .map(|c| (c.name(), self.get(*c)))
            .collect();
        out.sort_by_key(|(name, _)| *name);
        out
    }
}
