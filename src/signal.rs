//! Signal processing
//!
//! Converts raw accelerometer axes into a dimensionless gravity ratio:
//! ~1.0 at rest, ~0 in free fall, above 1 on impact.

use crate::error::DetectionError;
use crate::types::AccelSample;

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Stateless converter from per-axis acceleration to gravity ratio
pub struct SignalProcessor;

impl SignalProcessor {
    /// Euclidean magnitude of the acceleration vector divided by standard gravity.
    ///
    /// Non-finite axes (or a magnitude that overflows) are rejected.
    pub fn gravity_ratio(x: f64, y: f64, z: f64) -> Result<f64, DetectionError> {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(DetectionError::InvalidSample(format!(
                "non-finite axis value ({x}, {y}, {z})"
            )));
        }

        let ratio = magnitude(x, y, z) / STANDARD_GRAVITY;
        if !ratio.is_finite() {
            return Err(DetectionError::InvalidSample(format!(
                "magnitude overflow for ({x}, {y}, {z})"
            )));
        }

        Ok(ratio)
    }

    pub fn sample_ratio(sample: &AccelSample) -> Result<f64, DetectionError> {
        Self::gravity_ratio(sample.x, sample.y, sample.z)
    }
}

fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}
