use streaming::SourceError;

use crate::config::SessionConfigError;

/// Why a session could not start.
#[derive(Debug)]
pub enum SessionError {
    /// The frame service did not answer the metadata request.
    Metadata(SourceError),
    /// The video has no frames.
    EmptyVideo,
    Config(SessionConfigError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Metadata(e) => write!(f, "failed to load video metadata: {e}"),
            SessionError::EmptyVideo => write!(f, "video has no frames"),
            SessionError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Metadata(e) => Some(e),
            SessionError::EmptyVideo => None,
            SessionError::Config(e) => Some(e),
        }
    }
}

impl From<SessionConfigError> for SessionError {
    fn from(e: SessionConfigError) -> Self {
        SessionError::Config(e)
    }
}
