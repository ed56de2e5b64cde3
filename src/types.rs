//! Core types for the Synheart Fall detector
//!
//! This module defines the data that flows through detection: accelerometer
//! samples, intensity thresholds, the detection state and finalized events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DetectionError;

/// Detection sensitivity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    #[default]
    Medium,
    High,
}

impl Intensity {
    /// All tiers, ordered from least to most strict
    pub const ALL: [Intensity; 3] = [Intensity::Low, Intensity::Medium, Intensity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Low => "low",
            Intensity::Medium => "medium",
            Intensity::High => "high",
        }
    }

    /// Threshold profile for this tier
    pub fn profile(&self) -> IntensityProfile {
        match self {
            Intensity::Low => IntensityProfile {
                landing_gravity: 0.8,
                min_still_gravity: 0.8,
                max_still_gravity: 1.0,
            },
            Intensity::Medium => IntensityProfile {
                landing_gravity: 1.0,
                min_still_gravity: 0.9,
                max_still_gravity: 1.1,
            },
            Intensity::High => IntensityProfile {
                landing_gravity: 2.0,
                min_still_gravity: 1.0,
                max_still_gravity: 1.2,
            },
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intensity {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Intensity::Low),
            "medium" => Ok(Intensity::Medium),
            "high" => Ok(Intensity::High),
            other => Err(DetectionError::InvalidIntensity(other.to_string())),
        }
    }
}

/// Gravity-ratio thresholds used once a free-fall window is open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityProfile {
    /// A ratio above this within the first second counts as the landing impact
    pub landing_gravity: f64,
    /// Lower bound of the "not moving" band after landing
    pub min_still_gravity: f64,
    /// Upper bound of the "not moving" band after landing
    pub max_still_gravity: f64,
}

impl IntensityProfile {
    pub fn is_landing(&self, gravity_ratio: f64) -> bool {
        gravity_ratio > self.landing_gravity
    }

    pub fn is_still(&self, gravity_ratio: f64) -> bool {
        (self.min_still_gravity..=self.max_still_gravity).contains(&gravity_ratio)
    }
}

impl From<Intensity> for IntensityProfile {
    fn from(intensity: Intensity) -> Self {
        intensity.profile()
    }
}

/// One accelerometer reading (m/s² per axis) with the source's monotonic timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    /// Monotonic milliseconds supplied by the sample source
    pub timestamp_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelSample {
    pub fn new(timestamp_ms: i64, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp_ms,
            x,
            y,
            z,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// An open free-fall candidate awaiting landing and stillness
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionWindow {
    /// Identifies this window to scheduled re-checks
    pub generation: u64,
    /// When the gravity ratio first dropped below the free-fall threshold
    pub start_millis: i64,
    /// Whether the landing spike has been observed
    pub landing_confirmed: bool,
    /// Most recent gravity ratio observed while the window is open
    pub last_ratio: f64,
    /// Timestamp of the most recent evaluation
    pub last_seen_millis: i64,
}

/// Fall detection state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DetectionState {
    #[default]
    Idle,
    AwaitingLanding(DetectionWindow),
}

impl DetectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DetectionState::Idle)
    }

    pub fn window(&self) -> Option<&DetectionWindow> {
        match self {
            DetectionState::Idle => None,
            DetectionState::AwaitingLanding(window) => Some(window),
        }
    }
}

/// A confirmed fall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallEvent {
    /// Moment of confirmation (source milliseconds)
    pub timestamp_millis: i64,
    /// Time from free-fall onset to confirmation
    pub duration_millis: i64,
}

impl FallEvent {
    pub fn duration_secs(&self) -> f64 {
        self.duration_millis as f64 / 1000.0
    }

    /// Short notification-style description
    pub fn summary(&self) -> String {
        format!("Fall detected, lasted {:.3} seconds", self.duration_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intensity_profiles() {
        assert_eq!(
            Intensity::Low.profile(),
            IntensityProfile {
                landing_gravity: 0.8,
                min_still_gravity: 0.8,
                max_still_gravity: 1.0
            }
        );
        assert_eq!(Intensity::Medium.profile().landing_gravity, 1.0);
        assert_eq!(Intensity::High.profile().max_still_gravity, 1.2);
    }

    #[test]
    fn test_landing_thresholds_increase_with_strictness() {
        let landings: Vec<f64> = Intensity::ALL
            .iter()
            .map(|i| i.profile().landing_gravity)
            .collect();
        assert!(landings.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_intensity_parse() {
        assert_eq!("LOW".parse::<Intensity>().unwrap(), Intensity::Low);
        assert_eq!(" medium ".parse::<Intensity>().unwrap(), Intensity::Medium);
        assert!(matches!(
            "extreme".parse::<Intensity>(),
            Err(DetectionError::InvalidIntensity(_))
        ));
    }

    #[test]
    fn test_intensity_serde() {
        assert_eq!(serde_json::to_string(&Intensity::High).unwrap(), "\"high\"");
        let parsed: Intensity = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Intensity::Low);
    }

    #[test]
    fn test_still_band_inclusive() {
        let profile = Intensity::Medium.profile();
        assert!(profile.is_still(0.9));
        assert!(profile.is_still(1.1));
        assert!(!profile.is_still(1.11));
        assert!(!profile.is_landing(1.0));
        assert!(profile.is_landing(1.05));
    }

    #[test]
    fn test_event_summary() {
        let event = FallEvent {
            timestamp_millis: 2_000,
            duration_millis: 1_500,
        };
        assert_eq!(event.duration_secs(), 1.5);
        assert_eq!(event.summary(), "Fall detected, lasted 1.500 seconds");
    }
}
