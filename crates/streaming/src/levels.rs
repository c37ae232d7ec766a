use foundation::{FrameIndex, FrameRange};
use serde::{Deserialize, Serialize};

/// Frames fetched per chunk at every level.
pub const DEFAULT_FRAMES_PER_CHUNK: u32 = 32;

/// One temporal subsampling stride and the half-width of the window it covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuloLevel {
    pub modulo: u32,
    pub range: u32,
}

impl ModuloLevel {
    pub const fn new(modulo: u32, range: u32) -> Self {
        Self { modulo, range }
    }
}

/// Coarsest first: every 32nd frame over ±1024 down to every frame over ±32.
pub fn default_levels() -> Vec<ModuloLevel> {
    vec![
        ModuloLevel::new(32, 1024),
        ModuloLevel::new(8, 256),
        ModuloLevel::new(2, 64),
        ModuloLevel::new(1, 32),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelConfigError {
    NoLevels,
    ZeroFramesPerChunk,
    ZeroModulo { index: usize },
    ZeroRange { index: usize },
    NotCoarsestFirst { index: usize },
    ChunkTooLarge { index: usize },
}

impl std::fmt::Display for LevelConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelConfigError::NoLevels => write!(f, "at least one modulo level is required"),
            LevelConfigError::ZeroFramesPerChunk => write!(f, "frames per chunk must be positive"),
            LevelConfigError::ZeroModulo { index } => write!(f, "level {index}: modulo must be positive"),
            LevelConfigError::ZeroRange { index } => write!(f, "level {index}: range must be positive"),
            LevelConfigError::NotCoarsestFirst { index } => {
                write!(f, "level {index}: modulos must strictly decrease (coarsest first)")
            }
            LevelConfigError::ChunkTooLarge { index } => {
                write!(f, "level {index}: chunk size overflows a frame index")
            }
        }
    }
}

impl std::error::Error for LevelConfigError {}

/// Validated, coarsest-first list of modulo levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSet {
    levels: Vec<ModuloLevel>,
    frames_per_chunk: u32,
}

impl LevelSet {
    pub fn new(levels: Vec<ModuloLevel>, frames_per_chunk: u32) -> Result<Self, LevelConfigError> {
        if frames_per_chunk == 0 {
            return Err(LevelConfigError::ZeroFramesPerChunk);
        }
        if levels.is_empty() {
            return Err(LevelConfigError::NoLevels);
        }
        for (index, level) in levels.iter().enumerate() {
            if level.modulo == 0 {
                return Err(LevelConfigError::ZeroModulo { index });
            }
            if level.range == 0 {
                return Err(LevelConfigError::ZeroRange { index });
            }
            if level.modulo.checked_mul(frames_per_chunk).is_none() {
                return Err(LevelConfigError::ChunkTooLarge { index });
            }
            if index > 0 && levels[index - 1].modulo <= level.modulo {
                return Err(LevelConfigError::NotCoarsestFirst { index });
            }
        }
        Ok(Self {
            levels,
            frames_per_chunk,
        })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, level_index: usize) -> Option<ModuloLevel> {
        self.levels.get(level_index).copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = ModuloLevel> + '_ {
        self.levels.iter().copied()
    }

    pub fn frames_per_chunk(&self) -> u32 {
        self.frames_per_chunk
    }

    /// Frame span of one chunk at `modulo`. Validated not to overflow.
    pub fn chunk_size(&self, modulo: u32) -> u32 {
        self.frames_per_chunk.saturating_mul(modulo)
    }

    /// Most chunks a single window at `level_index` can overlap.
    pub fn max_chunks_per_window(&self, level_index: usize) -> usize {
        let Some(level) = self.get(level_index) else {
            return 0;
        };
        let size = u64::from(self.chunk_size(level.modulo));
        let span = 2 * u64::from(level.range);
        (span.div_ceil(size) + 1) as usize
    }
}

/// Cache address of a chunk: its stride and first frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    pub modulo: u32,
    pub start: FrameIndex,
}

impl ChunkKey {
    pub fn new(modulo: u32, start: FrameIndex) -> Self {
        Self { modulo, start }
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}@{}", self.modulo, self.start)
    }
}

/// A chunk resolved against the length of the video.
///
/// Membership is a pure function of `(modulo, start, total_frames)`: every
/// `modulo`-th frame of `[start, start + size)`, clipped to the video.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub key: ChunkKey,
    pub size: u32,
    pub total_frames: u32,
}

impl Chunk {
    pub fn new(key: ChunkKey, size: u32, total_frames: u32) -> Self {
        Self {
            key,
            size,
            total_frames,
        }
    }

    pub fn modulo(&self) -> u32 {
        self.key.modulo
    }

    pub fn start(&self) -> FrameIndex {
        self.key.start
    }

    fn end_exclusive(&self) -> u64 {
        (u64::from(self.key.start) + u64::from(self.size)).min(u64::from(self.total_frames))
    }

    /// Clipped inclusive span, or `None` if the chunk starts past the end.
    pub fn span(&self) -> Option<FrameRange> {
        let end = self.end_exclusive();
        if u64::from(self.key.start) >= end {
            return None;
        }
        Some(FrameRange::new(self.key.start, (end - 1) as FrameIndex))
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameIndex> {
        let step = self.key.modulo.max(1) as usize;
        (u64::from(self.key.start)..self.end_exclusive())
            .step_by(step)
            .map(|i| i as FrameIndex)
    }

    pub fn frame_indices(&self) -> Vec<FrameIndex> {
        self.frames().collect()
    }

    pub fn len(&self) -> usize {
        self.frames().count()
    }

    pub fn is_empty(&self) -> bool {
        self.span().is_none()
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        self.span().is_some_and(|span| span.contains(frame)) && frame % self.key.modulo.max(1) == 0
    }
}
