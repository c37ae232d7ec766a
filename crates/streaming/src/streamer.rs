use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use foundation::{FrameIndex, FrameRange};
use futures_util::future::join_all;
use parking_lot::Mutex;
use runtime::PositionCell;
use tracing::{debug, warn};

use crate::cache::ChunkCache;
use crate::config::{ConfigError, StreamingConfig};
use crate::decode::{decode_frame, DecodeError, DecodedFrame};
use crate::levels::Chunk;
use crate::planner::ChunkPlanner;
use crate::protocol::EncodedFrame;
use crate::source::FrameSource;
use crate::stats::{StreamCounter, StreamStats};
use crate::store::{FrameRecord, FrameStore, InstallOutcome, ResolvedFrame};

/// Chunk bookkeeping and decoded frames, always updated together.
#[derive(Debug)]
pub struct StreamState {
    pub cache: ChunkCache,
    pub store: FrameStore,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Every level around the center is loaded or in flight.
    Done,
    /// A newer generation started; no further batches were issued.
    Superseded,
    /// The streamer was closed.
    Closed,
}

/// Progressive, coarse-to-fine chunk loader for one video.
///
/// Each position change starts a new generation. A generation walks the
/// levels coarsest first and issues up to `max_concurrent` chunk fetches per
/// batch. A stale generation stops issuing batches but lets fetches it already
/// dispatched finish and install.
///
/// `state` is never locked across an `.await`.
pub struct Streamer {
    planner: ChunkPlanner,
    max_concurrent: usize,
    source: Arc<dyn FrameSource>,
    position: Arc<PositionCell>,
    state: Mutex<StreamState>,
    generation: AtomicU64,
    closed: AtomicBool,
    stats: StreamStats,
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer")
            .field("total_frames", &self.planner.total_frames())
            .field("generation", &self.current_generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Streamer {
    pub fn new(
        config: &StreamingConfig,
        source: Arc<dyn FrameSource>,
        position: Arc<PositionCell>,
    ) -> Result<Self, ConfigError> {
        let levels = config.validate()?;
        Ok(Self {
            planner: ChunkPlanner::new(levels, position.total_frames()),
            max_concurrent: config.max_concurrent,
            source,
            position,
            state: Mutex::new(StreamState {
                cache: ChunkCache::new(config.loaded_chunk_capacity),
                store: FrameStore::new(),
            }),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            stats: StreamStats::new(),
        })
    }

    pub fn planner(&self) -> &ChunkPlanner {
        &self.planner
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn position(&self) -> &Arc<PositionCell> {
        &self.position
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    /// Read access to the cache and store under the state lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&StreamState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn store_revision(&self) -> u64 {
        self.state.lock().store.revision()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Supersedes any running generation and returns the new generation id.
    pub fn begin_generation(&self) -> u64 {
        self.stats.inc(StreamCounter::GenerationsStarted);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops all scheduling and releases every decoded frame.
    ///
    /// Fetches still in flight are discarded when they resolve.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut state = self.state.lock();
        state.cache.clear();
        let released = state.store.clear();
        self.stats.add(StreamCounter::FramesReleased, released as u64);
        released
    }

    pub fn resolve(&self, frame: FrameIndex) -> Option<ResolvedFrame> {
        let state = self.state.lock();
        state
            .store
            .resolve(frame, self.planner.levels(), self.planner.total_frames())
    }

    /// Resolves every frame of `range` under a single lock.
    pub fn resolve_range(&self, range: FrameRange) -> Vec<(FrameIndex, Option<ResolvedFrame>)> {
        let state = self.state.lock();
        (range.start..=range.end)
            .map(|frame| {
                let resolved = state
                    .store
                    .resolve(frame, self.planner.levels(), self.planner.total_frames());
                (frame, resolved)
            })
            .collect()
    }

    pub fn build_queue(&self, center: FrameIndex, level_index: usize) -> Vec<Chunk> {
        let state = self.state.lock();
        self.planner.build_queue(center, level_index, &state.cache)
    }

    /// Runs one generation to completion, supersession or close.
    pub async fn run_generation(&self, generation: u64, center: FrameIndex) -> GenerationOutcome {
        debug!("generation {generation} started at frame {center}");
        self.release_orphans();
        let level_count = self.planner.levels().len();
        let mut level_index = 0;
        let mut queue: VecDeque<Chunk> = self.build_queue(center, level_index).into();

        loop {
            if self.is_closed() {
                return GenerationOutcome::Closed;
            }
            if !self.is_current(generation) {
                self.stats.inc(StreamCounter::GenerationsSuperseded);
                debug!("generation {generation} superseded at level {level_index}");
                return GenerationOutcome::Superseded;
            }

            if queue.is_empty() {
                level_index += 1;
                if level_index >= level_count {
                    self.stats.inc(StreamCounter::GenerationsCompleted);
                    let (frames, bytes) = self.with_state(|state| (state.store.len(), state.store.bytes()));
                    debug!("generation {generation} done, holding {frames} frames ({bytes} bytes)");
                    return GenerationOutcome::Done;
                }
                queue = self.build_queue(center, level_index).into();
                continue;
            }

            let batch = self.claim_batch(&mut queue, level_index);
            if batch.is_empty() {
                continue;
            }

            self.stats.inc(StreamCounter::BatchesIssued);
            debug!(
                "generation {generation}: level {level_index} batch of {} chunks",
                batch.len()
            );
            join_all(batch.into_iter().map(|chunk| self.load_chunk(chunk))).await;
        }
    }

    /// Drops chunks that left the window around the current position, then
    /// marks up to `max_concurrent` of the rest as in flight.
    fn claim_batch(&self, queue: &mut VecDeque<Chunk>, level_index: usize) -> Vec<Chunk> {
        let center_now = self.position.get();
        queue.retain(|chunk| self.planner.overlaps_window(chunk, center_now, level_index));

        let mut state = self.state.lock();
        let mut batch = Vec::with_capacity(self.max_concurrent.min(queue.len()));
        while batch.len() < self.max_concurrent {
            let Some(chunk) = queue.pop_front() else {
                break;
            };
            match state.cache.begin_fetch(chunk.key) {
                Ok(()) => batch.push(chunk),
                Err(e) => debug!("skipping {}: {e}", chunk.key),
            }
        }
        batch
    }

    async fn load_chunk(&self, chunk: Chunk) {
        let key = chunk.key;
        let wanted = chunk.frame_indices();
        self.stats.inc(StreamCounter::ChunksRequested);

        let frames = match self.source.fetch_frames(wanted.clone()).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("chunk {key} fetch failed: {e}");
                self.fail_chunk(&chunk);
                return;
            }
        };

        let decoded = match tokio::task::spawn_blocking(move || decode_batch(frames)).await {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("chunk {key} decode task failed: {e}");
                self.fail_chunk(&chunk);
                return;
            }
        };

        self.install_chunk(&chunk, &wanted, decoded);
    }

    fn install_chunk(
        &self,
        chunk: &Chunk,
        wanted: &[FrameIndex],
        decoded: Vec<Result<(FrameIndex, DecodedFrame), DecodeError>>,
    ) {
        let key = chunk.key;
        let mut state = self.state.lock();
        if self.is_closed() {
            return;
        }

        let mut received = BTreeSet::new();
        for result in decoded {
            let (index, image) = match result {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("chunk {key}: {e}");
                    self.stats.inc(StreamCounter::DecodeFailures);
                    continue;
                }
            };
            if wanted.binary_search(&index).is_err() {
                debug!("chunk {key}: ignoring unrequested frame {index}");
                continue;
            }
            match state.store.install(FrameRecord::new(index, key.modulo, image)) {
                InstallOutcome::Inserted => self.stats.inc(StreamCounter::FramesInstalled),
                InstallOutcome::Upgraded => self.stats.inc(StreamCounter::FramesUpgraded),
                InstallOutcome::Kept => {}
            }
            received.insert(index);
        }

        if received.len() < wanted.len() {
            warn!(
                "chunk {key} incomplete: {}/{} frames, will retry",
                received.len(),
                wanted.len()
            );
            if let Err(e) = state.cache.fail_fetch(key) {
                debug!("chunk {key} failed after reset: {e}");
            }
            self.release_unneeded(&mut state, chunk);
            self.stats.inc(StreamCounter::ChunksFailed);
            return;
        }

        match state.cache.complete_fetch(key) {
            Ok(evicted) => {
                self.stats.inc(StreamCounter::ChunksLoaded);
                for evicted_key in evicted {
                    debug!("evicting chunk {evicted_key}");
                    self.stats.inc(StreamCounter::ChunksEvicted);
                    let evicted_chunk = self.planner.chunk(evicted_key);
                    self.release_unneeded(&mut state, &evicted_chunk);
                }
            }
            Err(e) => debug!("chunk {key} completed after reset: {e}"),
        }
    }

    fn fail_chunk(&self, chunk: &Chunk) {
        self.stats.inc(StreamCounter::ChunksFailed);
        let mut state = self.state.lock();
        if let Err(e) = state.cache.fail_fetch(chunk.key) {
            debug!("chunk {} failed after reset: {e}", chunk.key);
        }
    }

    /// A record stays while a loaded chunk covers it or it lies inside a
    /// level window around the current position.
    fn is_needed(&self, cache: &ChunkCache, index: FrameIndex, center: FrameIndex) -> bool {
        self.planner.is_covered(index, cache) || self.planner.in_any_window(index, center)
    }

    /// Releases the chunk's frames that are no longer needed.
    fn release_unneeded(&self, state: &mut StreamState, chunk: &Chunk) {
        let center = self.position.get();
        let mut released = 0u64;
        for index in chunk.frames() {
            if self.is_needed(&state.cache, index, center) {
                continue;
            }
            if state.store.remove(index).is_some() {
                released += 1;
            }
        }
        if released > 0 {
            self.stats.add(StreamCounter::FramesReleased, released);
        }
    }

    /// Drops records kept only for a window the position has since left.
    fn release_orphans(&self) -> usize {
        let center = self.position.get();
        let mut state = self.state.lock();
        let StreamState { cache, store } = &mut *state;
        let released = store.retain(|record| self.is_needed(cache, record.index, center));
        if released > 0 {
            debug!("released {released} frames outside the window");
            self.stats.add(StreamCounter::FramesReleased, released as u64);
        }
        released
    }
}

fn decode_batch(frames: Vec<EncodedFrame>) -> Vec<Result<(FrameIndex, DecodedFrame), DecodeError>> {
    frames
        .into_iter()
        .map(|frame| decode_frame(frame.frame_index, &frame.bytes).map(|image| (frame.frame_index, image)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use runtime::PositionCell;

    use super::{GenerationOutcome, Streamer};
    use crate::config::StreamingConfig;
    use crate::levels::{ChunkKey, ModuloLevel};
    use crate::stats::StreamCounter;
    use crate::testing::{still_index, MemorySource};

    fn streamer(source: Arc<MemorySource>, total: u32, center: i64, config: StreamingConfig) -> Arc<Streamer> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let position = Arc::new(PositionCell::new(total, center));
        Arc::new(Streamer::new(&config, source, position).unwrap())
    }

    fn loaded(s: &Streamer, key: ChunkKey) -> bool {
        s.with_state(|state| state.cache.is_loaded(key))
    }

    /// Every loaded chunk has a record per frame, and every record is covered by a
    /// loaded chunk or sits in a window around the current position.
    fn assert_store_consistent(s: &Streamer) {
        let center = s.position().get();
        s.with_state(|state| {
            for key in state.cache.loaded_keys() {
                for frame in s.planner().chunk(key).frames() {
                    assert!(state.store.get(frame).is_some(), "{key} lacks frame {frame}");
                }
            }
            for frame in 0..s.planner().total_frames() {
                if state.store.get(frame).is_some() {
                    assert!(
                        s.planner().is_covered(frame, &state.cache) || s.planner().in_any_window(frame, center),
                        "orphan record {frame}"
                    );
                }
            }
        });
    }

    #[tokio::test]
    async fn loads_every_level_coarse_to_fine() {
        let source = Arc::new(MemorySource::new(100, 2, 2));
        let s = streamer(source.clone(), 100, 50, StreamingConfig::default());

        let generation = s.begin_generation();
        assert_eq!(s.run_generation(generation, 50).await, GenerationOutcome::Done);

        let requests = source.requests();
        assert_eq!(requests[0], (0..100).step_by(32).collect::<Vec<u32>>());
        assert_eq!(requests[1], (0..100).step_by(8).collect::<Vec<u32>>());

        // Finest window is [18, 82]: chunks 0, 32 and 64 of modulo 1.
        for frame in 0..96 {
            let resolved = s.resolve(frame).unwrap();
            assert!(resolved.is_exact(), "frame {frame}");
            assert_eq!(still_index(&resolved.record.image), frame);
        }
        // 97 only exists as a fallback to the modulo-2 neighbour.
        let fallback = s.resolve(97).unwrap();
        assert!(!fallback.is_exact());
        assert_eq!(fallback.record.index, 98);

        assert_eq!(s.stats().get(StreamCounter::ChunksFailed), 0);
        assert_eq!(s.with_state(|st| st.cache.in_flight_len()), 0);
        assert_store_consistent(&s);
    }

    #[tokio::test]
    async fn second_pass_at_same_center_fetches_nothing() {
        let source = Arc::new(MemorySource::new(5_000, 2, 2));
        let s = streamer(source.clone(), 5_000, 2_500, StreamingConfig::default());
        let first = s.begin_generation();
        s.run_generation(first, 2_500).await;
        let issued = source.request_count();

        let second = s.begin_generation();
        assert_eq!(s.run_generation(second, 2_500).await, GenerationOutcome::Done);
        assert_eq!(source.request_count(), issued);
    }

    #[tokio::test]
    async fn batches_are_bounded_by_max_concurrent() {
        let source = Arc::new(MemorySource::new(100_000, 2, 2));
        let config = StreamingConfig {
            frames_per_chunk: 4,
            levels: vec![ModuloLevel::new(1, 40)],
            loaded_chunk_capacity: 32,
            max_concurrent: 3,
        };
        let s = streamer(source.clone(), 100_000, 50_000, config);
        let generation = s.begin_generation();
        s.run_generation(generation, 50_000).await;

        // Window of 81 frames in 4-frame chunks: 21 chunks in batches of at most 3.
        assert_eq!(source.request_count(), 21);
        assert_eq!(s.stats().get(StreamCounter::BatchesIssued), 7);
    }

    #[tokio::test]
    async fn moving_mid_generation_halts_batches_but_installs_dispatched() {
        let source = Arc::new(MemorySource::new(4_096, 2, 2).gated());
        let s = streamer(source.clone(), 4_096, 2_048, StreamingConfig::default());

        let generation = s.begin_generation();
        let task = tokio::spawn({
            let s = s.clone();
            async move { s.run_generation(generation, 2_048).await }
        });

        while source.request_count() == 0 {
            tokio::task::yield_now().await;
        }
        let dispatched = source.requests();
        assert_eq!(dispatched.len(), 3, "coarse level covers three chunks");

        // The user jumps away while the first batch is still on the wire.
        s.position().set(100);
        s.begin_generation();
        source.release(64);

        assert_eq!(task.await.unwrap(), GenerationOutcome::Superseded);
        assert_eq!(source.request_count(), dispatched.len());
        for frame in dispatched.iter().flatten() {
            assert!(s.resolve(*frame).is_some_and(|r| r.is_exact()), "frame {frame}");
        }
        assert!(loaded(&s, ChunkKey::new(32, 2_048)));
    }

    #[tokio::test]
    async fn failed_chunk_is_isolated_and_retried() {
        let source = Arc::new(MemorySource::new(100, 2, 2));
        source.fail_frame(7);
        let s = streamer(source.clone(), 100, 50, StreamingConfig::default());

        let generation = s.begin_generation();
        assert_eq!(s.run_generation(generation, 50).await, GenerationOutcome::Done);
        assert_eq!(s.stats().get(StreamCounter::ChunksFailed), 1);
        assert!(!loaded(&s, ChunkKey::new(1, 0)));
        assert!(loaded(&s, ChunkKey::new(1, 32)));
        assert_eq!(s.with_state(|st| st.cache.in_flight_len()), 0);

        // Coarser data still paints the missing frame.
        let fallback = s.resolve(7).unwrap();
        assert_eq!(fallback.record.index, 8);

        source.clear_failures();
        let retry = s.begin_generation();
        s.run_generation(retry, 50).await;
        assert!(loaded(&s, ChunkKey::new(1, 0)));
        assert!(s.resolve(7).unwrap().is_exact());
        assert_store_consistent(&s);
    }

    #[tokio::test]
    async fn undecodable_frame_fails_only_its_chunk() {
        let source = Arc::new(MemorySource::new(100, 2, 2));
        source.corrupt_frame(33);
        let s = streamer(source.clone(), 100, 50, StreamingConfig::default());
        let generation = s.begin_generation();
        s.run_generation(generation, 50).await;

        assert!(!loaded(&s, ChunkKey::new(1, 32)));
        assert!(loaded(&s, ChunkKey::new(1, 0)));
        assert_eq!(s.stats().get(StreamCounter::DecodeFailures), 1);
        // Siblings that are also on coarser levels keep their (upgraded) records.
        assert!(s.resolve(34).unwrap().is_exact());
        assert!(!s.resolve(33).unwrap().is_exact());
        assert_store_consistent(&s);
    }

    #[tokio::test]
    async fn missing_frames_in_response_fail_the_chunk() {
        let source = Arc::new(MemorySource::new(100, 2, 2));
        source.drop_frame(40);
        let s = streamer(source.clone(), 100, 50, StreamingConfig::default());
        let generation = s.begin_generation();
        s.run_generation(generation, 50).await;

        assert!(!loaded(&s, ChunkKey::new(8, 0)));
        assert!(!loaded(&s, ChunkKey::new(2, 0)));
        assert!(!loaded(&s, ChunkKey::new(1, 32)));
        assert!(s.stats().get(StreamCounter::ChunksFailed) >= 3);
        assert_store_consistent(&s);
    }

    #[tokio::test]
    async fn eviction_releases_frames_no_longer_covered() {
        let source = Arc::new(MemorySource::new(1_000, 2, 2));
        let config = StreamingConfig {
            frames_per_chunk: 4,
            levels: vec![ModuloLevel::new(1, 4)],
            loaded_chunk_capacity: 3,
            max_concurrent: 6,
        };
        let s = streamer(source.clone(), 1_000, 10, config);

        let first = s.begin_generation();
        s.run_generation(first, 10).await;
        assert_eq!(s.with_state(|st| st.store.len()), 12);

        s.position().set(500);
        let second = s.begin_generation();
        s.run_generation(second, 500).await;

        s.with_state(|st| {
            assert_eq!(st.cache.loaded(1).len(), 3);
            assert_eq!(st.store.len(), 12);
            assert!(st.store.get(10).is_none());
            assert!(st.store.get(500).is_some());
        });
        assert_eq!(s.stats().get(StreamCounter::ChunksEvicted), 3);
        assert_eq!(s.stats().get(StreamCounter::FramesReleased), 12);
        assert_store_consistent(&s);
    }

    #[tokio::test]
    async fn eviction_is_strictly_oldest_first_and_window_frames_survive() {
        let source = Arc::new(MemorySource::new(1_000, 2, 2));
        let config = StreamingConfig {
            frames_per_chunk: 4,
            levels: vec![ModuloLevel::new(1, 4)],
            loaded_chunk_capacity: 3,
            max_concurrent: 1,
        };
        let s = streamer(source.clone(), 1_000, 10, config);

        let first = s.begin_generation();
        s.run_generation(first, 10).await;
        assert_eq!(s.with_state(|st| st.cache.loaded(1)), vec![8, 12, 4]);

        // Window [14, 22] still overlaps chunk 12, but 8 and then 12 are the oldest.
        s.position().set(18);
        let second = s.begin_generation();
        s.run_generation(second, 18).await;
        assert_eq!(s.with_state(|st| st.cache.loaded(1)), vec![4, 16, 20]);
        assert_eq!(s.stats().get(StreamCounter::ChunksEvicted), 2);

        s.with_state(|st| {
            for frame in 8..14 {
                assert!(st.store.get(frame).is_none(), "frame {frame}");
            }
            // 14 and 15 lost their chunk but are still on screen.
            assert!(st.store.get(14).is_some());
            assert!(st.store.get(15).is_some());
            assert_eq!(st.store.len(), 14);
        });
        assert_eq!(s.stats().get(StreamCounter::FramesReleased), 6);
        assert_store_consistent(&s);

        // Once the window moves on, the next generation sweeps them.
        s.position().set(600);
        assert_eq!(s.release_orphans(), 2);
        assert!(s.resolve(14).is_none());
        assert_store_consistent(&s);
    }

    #[tokio::test]
    async fn close_releases_everything_and_discards_late_results() {
        let source = Arc::new(MemorySource::new(4_096, 2, 2).gated());
        let s = streamer(source.clone(), 4_096, 100, StreamingConfig::default());
        let generation = s.begin_generation();
        let task = tokio::spawn({
            let s = s.clone();
            async move { s.run_generation(generation, 100).await }
        });
        while source.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        s.close();
        source.release(64);
        assert_eq!(task.await.unwrap(), GenerationOutcome::Closed);
        assert_eq!(s.with_state(|st| st.store.len()), 0);
        assert!(s.resolve(0).is_none());
    }
}
