//! Interactive scrubbing over a streamed video.
//!
//! [`ScrubSession`] ties the streaming core to user input and a fixed-rate
//! render loop, and publishes [`DisplaySnapshot`]s for the UI to draw.

pub mod config;
pub mod error;
pub mod overlay;
pub mod session;
pub mod snapshot;

pub use config::{SessionConfig, SessionConfigError};
pub use error::SessionError;
pub use overlay::{AnnotationOverlayResolver, OverlayFetch, OverlaySpan};
pub use session::{ScrubSession, SnapshotReceiver};
pub use snapshot::{CursorState, DisplaySnapshot, SessionView, SnapshotError, ViewFingerprint, VisibleFrame};
