//! Detector configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::DetectionError;
use crate::types::Intensity;

/// Default period between re-checks of an open detection window
pub const DEFAULT_RECHECK_INTERVAL_MS: u64 = 500;

/// Configuration for a detector or monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Sensitivity tier, fixed for the detector's lifetime
    pub intensity: Intensity,

    /// Period of the scheduled re-check while a window is open (ms)
    pub recheck_interval_ms: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "synheart_fall=debug,warn")
    pub level: String,

    /// Whether to output structured JSON logs
    pub json: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            intensity: Intensity::default(),
            recheck_interval_ms: DEFAULT_RECHECK_INTERVAL_MS,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl DetectorConfig {
    pub fn with_intensity(intensity: Intensity) -> Self {
        Self {
            intensity,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, DetectionError> {
        let config: DetectorConfig = serde_json::from_str(json)
            .map_err(|e| DetectionError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.recheck_interval_ms == 0 {
            return Err(DetectionError::ConfigError(
                "recheck_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }
}
