use runtime::{MomentumConfig, RenderConfig};
use serde::{Deserialize, Serialize};
use streaming::{ConfigError, LevelSet, StreamingConfig};

/// Everything a [`crate::ScrubSession`] can be tuned with.
///
/// Missing fields fall back to their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub streaming: StreamingConfig,
    pub render: RenderConfig,
    pub momentum: MomentumConfig,
    /// Frames shown on each side of the current one.
    pub visible_radius: u32,
    /// Extra frames fetched around the visible range for the annotation overlay.
    pub annotation_padding: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            streaming: StreamingConfig::default(),
            render: RenderConfig::default(),
            momentum: MomentumConfig::default(),
            visible_radius: 8,
            annotation_padding: 128,
        }
    }
}

#[derive(Debug)]
pub enum SessionConfigError {
    Json(serde_json::Error),
    Streaming(ConfigError),
    InvalidRender(&'static str),
    InvalidMomentum(&'static str),
}

impl std::fmt::Display for SessionConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionConfigError::Json(e) => write!(f, "malformed session config: {e}"),
            SessionConfigError::Streaming(e) => write!(f, "invalid streaming config: {e}"),
            SessionConfigError::InvalidRender(what) => write!(f, "invalid render config: {what}"),
            SessionConfigError::InvalidMomentum(what) => write!(f, "invalid momentum config: {what}"),
        }
    }
}

impl std::error::Error for SessionConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionConfigError::Json(e) => Some(e),
            SessionConfigError::Streaming(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SessionConfigError {
    fn from(e: ConfigError) -> Self {
        SessionConfigError::Streaming(e)
    }
}

impl SessionConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, SessionConfigError> {
        let config: SessionConfig = serde_json::from_str(json).map_err(SessionConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<LevelSet, SessionConfigError> {
        let levels = self.streaming.validate()?;

        let hz = self.render.target_hz;
        if !hz.is_finite() || hz <= 0.0 {
            return Err(SessionConfigError::InvalidRender("target_hz must be positive"));
        }

        let m = &self.momentum;
        if !(m.pixels_per_frame > 0.0) {
            return Err(SessionConfigError::InvalidMomentum("pixels_per_frame must be positive"));
        }
        if !(m.friction > 0.0 && m.friction < 1.0) {
            return Err(SessionConfigError::InvalidMomentum("friction must be in (0, 1)"));
        }
        if !(m.stop_epsilon > 0.0) {
            return Err(SessionConfigError::InvalidMomentum("stop_epsilon must be positive"));
        }
        if !(0.0..=1.0).contains(&m.velocity_smoothing) {
            return Err(SessionConfigError::InvalidMomentum("velocity_smoothing must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&m.min_opacity) {
            return Err(SessionConfigError::InvalidMomentum("min_opacity must be in [0, 1]"));
        }
        Ok(levels)
    }
}
