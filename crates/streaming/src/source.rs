//! The frame service seam.
//!
//! The streaming core only talks to storage through [`FrameSource`]; the HTTP
//! binding lives in `http.rs` and an in-memory one in `testing.rs`.

use std::future::Future;
use std::pin::Pin;

use foundation::{FrameIndex, FrameRange};

use crate::protocol::{Annotation, EncodedFrame, VideoMetadata};

/// Boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug)]
pub struct SourceError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Remote storage holding the extracted stills and their annotations.
///
/// Methods return boxed futures so the trait stays dyn-compatible.
pub trait FrameSource: Send + Sync {
    /// Frame count and dimensions. Called once when a session starts.
    fn metadata(&self) -> BoxFuture<'_, Result<VideoMetadata, SourceError>>;

    /// Encoded stills for exactly the requested indices.
    ///
    /// Frames missing from the response are treated as a failed chunk by the caller.
    fn fetch_frames(&self, indices: Vec<FrameIndex>) -> BoxFuture<'_, Result<Vec<EncodedFrame>, SourceError>>;

    /// Annotations overlapping the inclusive `range`.
    fn fetch_annotations(&self, range: FrameRange) -> BoxFuture<'_, Result<Vec<Annotation>, SourceError>>;
}
