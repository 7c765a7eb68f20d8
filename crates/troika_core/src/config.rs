//! Runtime configuration
//!
//! Loaded from TOML; every section and field is optional.
//!
//! ```toml
//! [worker]
//! mode = "main_thread"
//! leak_warning_threshold = 500
//!
//! [frame]
//! continuous_render = true
//!
//! [physics]
//! gravity = [0.0, -9.81, 0.0]
//! timestep = 0.016
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use troika_worker::RegistryConfig;

use crate::error::ConfigError;

/// Frame loop settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Render every frame instead of only when something changed
    pub continuous_render: bool,
}

/// Physics world settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Acceleration in world units per second squared
    pub gravity: [f64; 3],
    /// Fixed simulation step in seconds
    pub timestep: f64,
    /// Upper bound on fixed steps per frame, to avoid a spiral of death
    pub max_substeps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            timestep: 1.0 / 60.0,
            max_substeps: 4,
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TroikaConfig {
    pub worker: RegistryConfig,
    pub frame: FrameConfig,
    pub physics: PhysicsConfig,
}

impl TroikaConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded troika config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troika_worker::ExecutionMode;

    #[test]
    fn test_empty_source_gives_defaults() {
        assert_eq!(TroikaConfig::from_toml_str("").unwrap(), TroikaConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = TroikaConfig::from_toml_str(
            r#"
            [worker]
            mode = "main_thread"

            [physics]
            gravity = [0.0, 0.0, 0.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.worker.mode, ExecutionMode::MainThread);
        assert_eq!(config.worker.leak_warning_threshold, 1000);
        assert_eq!(config.physics.gravity, [0.0, 0.0, 0.0]);
        assert_eq!(config.physics.max_substeps, 4);
        assert!(!config.frame.continuous_render);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        assert!(matches!(
            TroikaConfig::from_toml_str("[frame]\ncontinuous_render = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        assert!(matches!(
            TroikaConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
