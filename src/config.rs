//! Configuration for the armband gesture pipeline.

use crate::core::features::DEFAULT_AR_ORDER;
use crate::core::resample::DEFAULT_GRID_STEP_US;
use crate::recording::SensorKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration for training and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame counts per classified sensor
    pub frames: FrameConfig,

    /// Spacing of the uniform time grid, in microseconds
    pub grid_step_us: i64,

    /// Per-class HMM settings
    pub hmm: HmmConfig,

    /// Autoregressive model order for EMG channels
    pub ar_order: usize,

    /// Directory for the pipeline log and other state
    pub data_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("armband-gesture");

        Self {
            frames: FrameConfig::default(),
            grid_step_us: DEFAULT_GRID_STEP_US,
            hmm: HmmConfig::default(),
            ar_order: DEFAULT_AR_ORDER,
            data_path: data_dir,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when it is absent.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: PipelineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("armband-gesture")
            .join("config.json")
    }

    /// Path of the persisted pipeline log.
    pub fn log_path(&self) -> PathBuf {
        self.data_path.join("pipeline_log.json")
    }

    /// Reject settings no pipeline stage can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_step_us <= 0 {
            return Err(ConfigError::Invalid(format!(
                "grid_step_us must be positive, got {}",
                self.grid_step_us
            )));
        }
        for kind in SensorKind::CLASSIFIED {
            if self.frames.get(kind) == 0 {
                return Err(ConfigError::Invalid(format!(
                    "frame count for {kind} must be at least 1"
                )));
            }
        }
        if self.hmm.states_per_class == 0 {
            return Err(ConfigError::Invalid(
                "states_per_class must be at least 1".to_string(),
            ));
        }
        if self.hmm.min_covariance <= 0.0 {
            return Err(ConfigError::Invalid(
                "min_covariance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of frames each classified sensor's recordings are split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    pub accelerometer: usize,
    pub gyroscope: usize,
    pub orientation: usize,
    pub emg: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::uniform(4)
    }
}

impl FrameConfig {
    /// Same frame count for every sensor.
    pub fn uniform(frame_count: usize) -> Self {
        Self {
            accelerometer: frame_count,
            gyroscope: frame_count,
            orientation: frame_count,
            emg: frame_count,
        }
    }

    /// Frame count for `kind`. Euler orientation is never classified.
    pub fn get(&self, kind: SensorKind) -> usize {
        match kind {
            SensorKind::Accelerometer => self.accelerometer,
            SensorKind::Gyroscope => self.gyroscope,
            SensorKind::Orientation | SensorKind::OrientationEuler => self.orientation,
            SensorKind::Emg => self.emg,
        }
    }
}

/// Settings shared by every per-class Gaussian HMM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmConfig {
    /// Hidden states in each class model
    pub states_per_class: usize,
    /// EM iteration cap
    pub max_iterations: usize,
    /// Stop when the log-likelihood gain drops below this
    pub tolerance: f64,
    /// Floor added to every variance
    pub min_covariance: f64,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            states_per_class: 3,
            max_iterations: 10,
            tolerance: 1e-2,
            min_covariance: 1e-3,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.frames, FrameConfig::uniform(4));
        assert_eq!(config.grid_step_us, 1_000);
        assert_eq!(config.hmm.states_per_class, 3);
        assert_eq!(config.ar_order, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = PipelineConfig::default();
        config.frames.emg = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.grid_step_us = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.hmm.states_per_class = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = PipelineConfig::default();
        config.frames.gyroscope = 6;
        config.hmm.max_iterations = 25;
        config.save_to(&path).unwrap();

        let loaded = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PipelineConfig::load_from(dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.frames, FrameConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "ar_order": 6 }"#).unwrap();

        let loaded = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.ar_order, 6);
        assert_eq!(loaded.hmm, HmmConfig::default());
    }

    #[test]
    fn test_frame_config_lookup() {
        let frames = FrameConfig {
            accelerometer: 1,
            gyroscope: 2,
            orientation: 3,
            emg: 4,
        };
        assert_eq!(frames.get(SensorKind::Gyroscope), 2);
        assert_eq!(frames.get(SensorKind::Emg), 4);
    }
}
