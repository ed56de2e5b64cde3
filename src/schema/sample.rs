//! Sample record validation

use crate::types::AccelSample;

/// Validation errors for sample records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Axis {axis} is not a finite number")]
    NonFiniteAxis { axis: char },

    #[error("Timestamp went backward: {actual} ms after {previous} ms")]
    TimestampWentBackward { previous: i64, actual: i64 },
}

impl AccelSample {
    /// Validate a single record in isolation
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (axis, value) in [('x', self.x), ('y', self.y), ('z', self.z)] {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteAxis { axis });
            }
        }
        Ok(())
    }

    /// Validate this record as the successor of `previous` in a stream
    pub fn validate_after(&self, previous: &AccelSample) -> Result<(), ValidationError> {
        self.validate()?;
        if self.timestamp_ms < previous.timestamp_ms {
            return Err(ValidationError::TimestampWentBackward {
                previous: previous.timestamp_ms,
                actual: self.timestamp_ms,
            });
        }
        Ok(())
    }
}
