use serde::{Deserialize, Serialize};

use crate::levels::{default_levels, LevelConfigError, LevelSet, ModuloLevel, DEFAULT_FRAMES_PER_CHUNK};

/// Tuning for the progressive chunk loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub frames_per_chunk: u32,

    /// Coarsest first.
    pub levels: Vec<ModuloLevel>,

    /// Loaded chunks remembered per modulo before the oldest is evicted.
    pub loaded_chunk_capacity: usize,

    /// Chunk fetches issued together in one batch.
    pub max_concurrent: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            frames_per_chunk: DEFAULT_FRAMES_PER_CHUNK,
            levels: default_levels(),
            loaded_chunk_capacity: 5,
            max_concurrent: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Levels(LevelConfigError),
    ZeroCapacity,
    ZeroConcurrency,
    /// The cache could not even hold the chunks of one window.
    CapacityBelowWindow { modulo: u32, needed: usize, capacity: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Levels(e) => write!(f, "invalid levels: {e}"),
            ConfigError::ZeroCapacity => write!(f, "loaded_chunk_capacity must be positive"),
            ConfigError::ZeroConcurrency => write!(f, "max_concurrent must be positive"),
            ConfigError::CapacityBelowWindow {
                modulo,
                needed,
                capacity,
            } => write!(
                f,
                "modulo {modulo} windows span up to {needed} chunks but capacity is {capacity}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Levels(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LevelConfigError> for ConfigError {
    fn from(e: LevelConfigError) -> Self {
        ConfigError::Levels(e)
    }
}

impl StreamingConfig {
    pub fn validate(&self) -> Result<LevelSet, ConfigError> {
        let levels = LevelSet::new(self.levels.clone(), self.frames_per_chunk)?;
        if self.loaded_chunk_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        for (index, level) in levels.iter().enumerate() {
            let needed = levels.max_chunks_per_window(index);
            if needed > self.loaded_chunk_capacity {
                return Err(ConfigError::CapacityBelowWindow {
                    modulo: level.modulo,
                    needed,
                    capacity: self.loaded_chunk_capacity,
                });
            }
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StreamingConfig};
    use crate::levels::ModuloLevel;

    #[test]
    fn defaults_are_valid() {
        let levels = StreamingConfig::default().validate().unwrap();
        assert_eq!(levels.len(), 4);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: StreamingConfig = serde_json::from_str(r#"{"max_concurrent": 2}"#).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.frames_per_chunk, 32);
        assert_eq!(config.loaded_chunk_capacity, 5);
    }

    #[test]
    fn capacity_must_cover_a_window() {
        let config = StreamingConfig {
            loaded_chunk_capacity: 2,
            ..StreamingConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::CapacityBelowWindow {
                modulo: 32,
                needed: 3,
                capacity: 2
            })
        );
    }

    #[test]
    fn level_errors_are_wrapped() {
        let config = StreamingConfig {
            levels: vec![ModuloLevel::new(1, 8), ModuloLevel::new(4, 8)],
            ..StreamingConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Levels(_))));
    }
}
