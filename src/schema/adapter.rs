//! Parsing and batch validation of sample input

use crate::error::DetectionError;
use crate::schema::sample::ValidationError;
use crate::types::AccelSample;

/// Reader for accelerometer sample input
pub struct SampleAdapter;

impl SampleAdapter {
    /// Parse a JSON string containing an array of samples
    pub fn parse_array(json: &str) -> Result<Vec<AccelSample>, DetectionError> {
        let samples: Vec<AccelSample> = serde_json::from_str(json)?;
        Ok(samples)
    }

    /// Parse NDJSON (newline-delimited JSON) containing samples
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<AccelSample>, DetectionError> {
        let mut samples = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            if let Some(sample) = Self::parse_line(line).map_err(|e| {
                DetectionError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })? {
                samples.push(sample);
            }
        }
        Ok(samples)
    }

    /// Parse one NDJSON line; blank lines yield `None`
    pub fn parse_line(line: &str) -> Result<Option<AccelSample>, serde_json::Error> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(trimmed).map(Some)
    }

    /// Validate a batch of samples, returning only the failures
    pub fn validate_samples(samples: &[AccelSample]) -> Vec<ValidationResult> {
        samples
            .iter()
            .enumerate()
            .filter_map(|(index, sample)| {
                let result = match index.checked_sub(1).map(|prev| &samples[prev]) {
                    Some(previous) => sample.validate_after(previous),
                    None => sample.validate(),
                };
                result.err().map(|error| ValidationResult {
                    index,
                    timestamp_ms: sample.timestamp_ms,
                    error,
                })
            })
            .collect()
    }
}

/// A failed sample validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub timestamp_ms: i64,
    pub error: ValidationError,
}
