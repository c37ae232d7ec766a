use foundation::{FrameIndex, FrameRange};

use crate::cache::ChunkCache;
use crate::levels::{Chunk, ChunkKey, LevelSet};

/// Maps a playhead position to the chunks each level still has to fetch.
///
/// Pure and deterministic: the same center always yields the same chunk keys,
/// which is what makes `ChunkCache` addressing stable.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    levels: LevelSet,
    total_frames: u32,
}

impl ChunkPlanner {
    pub fn new(levels: LevelSet, total_frames: u32) -> Self {
        Self {
            levels,
            total_frames,
        }
    }

    pub fn levels(&self) -> &LevelSet {
        &self.levels
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    pub fn chunk(&self, key: ChunkKey) -> Chunk {
        Chunk::new(key, self.levels.chunk_size(key.modulo), self.total_frames)
    }

    /// Key of the `modulo` chunk whose span contains `frame`.
    pub fn chunk_containing(&self, frame: FrameIndex, modulo: u32) -> ChunkKey {
        let size = self.levels.chunk_size(modulo).max(1);
        ChunkKey::new(modulo, frame - frame % size)
    }

    /// `[center - range, center + range]` for the level, clipped to the video.
    pub fn window(&self, center: FrameIndex, level_index: usize) -> Option<FrameRange> {
        let level = self.levels.get(level_index)?;
        FrameRange::around(center, level.range, self.total_frames)
    }

    /// Every chunk of the level overlapping the window, nearest to `center` first.
    pub fn chunks_in_window(&self, center: FrameIndex, level_index: usize) -> Vec<Chunk> {
        let (Some(level), Some(window)) = (self.levels.get(level_index), self.window(center, level_index))
        else {
            return Vec::new();
        };

        let size = u64::from(self.levels.chunk_size(level.modulo).max(1));
        let mut start = u64::from(window.start) - u64::from(window.start) % size;
        let mut chunks = Vec::new();
        while start <= u64::from(window.end) {
            chunks.push(self.chunk(ChunkKey::new(level.modulo, start as FrameIndex)));
            start += size;
        }

        chunks.sort_by_key(|chunk| {
            let distance = chunk.span().map_or(u32::MAX, |span| span.distance_to(center));
            (distance, chunk.start())
        });
        chunks
    }

    /// Chunks of the level around `center` that are neither loaded nor in flight.
    pub fn build_queue(&self, center: FrameIndex, level_index: usize, cache: &ChunkCache) -> Vec<Chunk> {
        self.chunks_in_window(center, level_index)
            .into_iter()
            .filter(|chunk| !cache.contains(chunk.key))
            .collect()
    }

    /// Whether `chunk` still overlaps the level's window around `center`.
    pub fn overlaps_window(&self, chunk: &Chunk, center: FrameIndex, level_index: usize) -> bool {
        match (chunk.span(), self.window(center, level_index)) {
            (Some(span), Some(window)) => span.overlaps(&window),
            _ => false,
        }
    }

    /// Whether some loaded chunk, at any level, contains `frame`.
    pub fn is_covered(&self, frame: FrameIndex, cache: &ChunkCache) -> bool {
        self.levels
            .iter()
            .filter(|level| frame % level.modulo == 0)
            .any(|level| cache.is_loaded(self.chunk_containing(frame, level.modulo)))
    }

    /// Whether `frame` sits on the grid of some level whose window around
    /// `center` contains it.
    pub fn in_any_window(&self, frame: FrameIndex, center: FrameIndex) -> bool {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, level)| frame % level.modulo == 0)
            .any(|(level_index, _)| {
                self.window(center, level_index)
                    .is_some_and(|window| window.contains(frame))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::ChunkPlanner;
    use crate::cache::ChunkCache;
    use crate::levels::{default_levels, ChunkKey, LevelSet, ModuloLevel};

    fn planner(total_frames: u32) -> ChunkPlanner {
        ChunkPlanner::new(LevelSet::new(default_levels(), 32).unwrap(), total_frames)
    }

    #[test]
    fn single_coarse_chunk_for_short_video() {
        let p = ChunkPlanner::new(LevelSet::new(vec![ModuloLevel::new(32, 1024)], 32).unwrap(), 1000);
        let queue = p.build_queue(500, 0, &ChunkCache::new(5));
        assert_eq!(queue.len(), 1);

        let chunk = queue[0];
        assert_eq!(chunk.key, ChunkKey::new(32, 0));
        assert_eq!(chunk.size, 1024);
        let span = chunk.span().unwrap();
        assert_eq!((span.start, span.end), (0, 999));
        let expected: Vec<u32> = (0..32).map(|i| i * 32).collect();
        assert_eq!(chunk.frame_indices(), expected);
    }

    #[test]
    fn never_plans_chunks_outside_the_video() {
        for total in [1u32, 2, 31, 32, 33, 999, 1000, 1025, 5000] {
            let p = planner(total);
            for center in [0u32, 1, total / 2, total.saturating_sub(1), total + 50] {
                for level in 0..p.levels().len() {
                    for chunk in p.build_queue(center, level, &ChunkCache::new(5)) {
                        let frames = chunk.frame_indices();
                        assert!(!frames.is_empty(), "empty chunk {} total={total}", chunk.key);
                        assert!(frames.iter().all(|f| *f < total));
                    }
                }
            }
        }
    }

    #[test]
    fn queue_is_empty_once_loaded() {
        let p = planner(10_000);
        let mut cache = ChunkCache::new(5);
        for level in 0..p.levels().len() {
            let queue = p.build_queue(4_321, level, &cache);
            assert!(!queue.is_empty());
            for chunk in &queue {
                cache.begin_fetch(chunk.key).unwrap();
                cache.complete_fetch(chunk.key).unwrap();
            }
            assert!(p.build_queue(4_321, level, &cache).is_empty());
        }
    }

    #[test]
    fn in_flight_chunks_are_excluded() {
        let p = planner(10_000);
        let mut cache = ChunkCache::new(5);
        let first = p.build_queue(5_000, 3, &cache);
        cache.begin_fetch(first[0].key).unwrap();
        let second = p.build_queue(5_000, 3, &cache);
        assert_eq!(second.len(), first.len() - 1);
        assert!(second.iter().all(|c| c.key != first[0].key));
    }

    #[test]
    fn nearest_chunk_comes_first_and_planning_is_deterministic() {
        let p = planner(10_000);
        let a = p.build_queue(5_000, 0, &ChunkCache::new(5));
        let b = p.build_queue(5_000, 0, &ChunkCache::new(5));
        assert_eq!(a, b);
        // 5000 lies in the 4096..5119 chunk.
        assert_eq!(a[0].key, ChunkKey::new(32, 4096));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn window_overlap_tracks_center() {
        let p = planner(10_000);
        let chunk = p.chunk(ChunkKey::new(1, 5_000 - 5_000 % 32));
        assert!(p.overlaps_window(&chunk, 5_000, 3));
        assert!(!p.overlaps_window(&chunk, 8_000, 3));
        assert!(!p.overlaps_window(&chunk, 5_000, 99));
    }

    #[test]
    fn coverage_checks_every_level() {
        let p = planner(10_000);
        let mut cache = ChunkCache::new(5);
        let key = ChunkKey::new(32, 0);
        cache.begin_fetch(key).unwrap();
        cache.complete_fetch(key).unwrap();
        assert!(p.is_covered(64, &cache));
        assert!(!p.is_covered(65, &cache));
        assert!(!p.is_covered(1_024, &cache));
    }

    #[test]
    fn window_membership_respects_each_level_grid() {
        let p = planner(10_000);
        // m1 window around 5_000 is [4_968, 5_032].
        assert!(p.in_any_window(5_001, 5_000));
        assert!(!p.in_any_window(5_033, 5_000));
        // m2 reaches 64 out, but only on even frames.
        assert!(p.in_any_window(5_050, 5_000));
        assert!(!p.in_any_window(5_051, 5_000));
        // m32 reaches 1_024 out on multiples of 32.
        assert!(p.in_any_window(5_984, 5_000));
        assert!(!p.in_any_window(7_008, 5_000));
    }
}
