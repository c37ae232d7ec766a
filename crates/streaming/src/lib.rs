//! Progressive multi-resolution frame streaming.
//!
//! Frames are fetched in modulo levels, coarsest first, so a sparse preview of
//! the neighbourhood around the playhead arrives before the dense one.

pub mod cache;
pub mod config;
pub mod decode;
pub mod http;
pub mod levels;
pub mod planner;
pub mod protocol;
pub mod source;
pub mod stats;
pub mod store;
pub mod streamer;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use cache::{CacheError, ChunkCache};
pub use config::{ConfigError, StreamingConfig};
pub use decode::{decode_frame, DecodeError, DecodedFrame};
pub use http::HttpFrameSource;
pub use levels::{default_levels, Chunk, ChunkKey, LevelConfigError, LevelSet, ModuloLevel};
pub use planner::ChunkPlanner;
pub use protocol::{Annotation, EncodedFrame, VideoMetadata};
pub use source::{BoxFuture, FrameSource, SourceError};
pub use stats::{StreamCounter, StreamStats};
pub use store::{FrameRecord, FrameStore, ImageHandle, InstallOutcome, ResolvedFrame};
pub use streamer::{GenerationOutcome, StreamState, Streamer};
