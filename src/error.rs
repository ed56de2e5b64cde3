//! Error types for Synheart Fall

use thiserror::Error;

/// Errors that can occur while detecting falls
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Failed to parse sample input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown intensity: {0} (expected low, medium or high)")]
    InvalidIntensity(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Fall monitor is no longer running")]
    MonitorClosed,
}
