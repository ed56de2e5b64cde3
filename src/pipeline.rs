//! Detection pipeline
//!
//! This module provides the public API for Synheart Fall. It wires the
//! signal processor, the state machine and an optional sink together.

use std::sync::Arc;
use tracing::debug;

use crate::detector::FallStateMachine;
use crate::error::DetectionError;
use crate::schema::SampleAdapter;
use crate::signal::SignalProcessor;
use crate::sink::FallSink;
use crate::types::{AccelSample, DetectionState, FallEvent, Intensity};

/// Run a batch of samples through a fresh detector (stateless, one-shot).
///
/// Invalid samples are skipped.
///
/// # Example
/// ```ignore
/// let events = detect_falls(&samples, Intensity::Medium);
/// ```
pub fn detect_falls(samples: &[AccelSample], intensity: Intensity) -> Vec<FallEvent> {
    let mut detector = FallDetector::new(intensity);
    samples
        .iter()
        .filter_map(|sample| detector.process(sample).ok().flatten())
        .collect()
}

/// Detect falls in NDJSON sample input and return the events as NDJSON.
///
/// # Arguments
/// * `ndjson` - One `{"timestamp_ms", "x", "y", "z"}` record per line
/// * `intensity` - Detection sensitivity tier
pub fn detect_falls_ndjson(ndjson: &str, intensity: Intensity) -> Result<String, DetectionError> {
    let samples = SampleAdapter::parse_ndjson(ndjson)?;
    let mut output = String::new();
    for event in detect_falls(&samples, intensity) {
        output.push_str(&serde_json::to_string(&event)?);
        output.push('\n');
    }
    Ok(output)
}

/// Stateful fall detector.
///
/// Feed samples in arrival order from a single thread. Confirmed events are
/// returned and also forwarded to the configured sink, if any.
pub struct FallDetector {
    intensity: Intensity,
    machine: FallStateMachine,
    sink: Option<Arc<dyn FallSink>>,
}

impl Default for FallDetector {
    fn default() -> Self {
        Self::new(Intensity::default())
    }
}

impl std::fmt::Debug for FallDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallDetector")
            .field("intensity", &self.intensity)
            .field("state", self.machine.state())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl FallDetector {
    /// Create a detector without a sink
    pub fn new(intensity: Intensity) -> Self {
        Self {
            intensity,
            machine: FallStateMachine::new(intensity),
            sink: None,
        }
    }

    pub fn builder() -> FallDetectorBuilder {
        FallDetectorBuilder::default()
    }

    pub fn intensity(&self) -> Intensity {
        self.intensity
    }

    pub fn state(&self) -> &DetectionState {
        self.machine.state()
    }

    /// Process one sample using its own timestamp
    pub fn process(&mut self, sample: &AccelSample) -> Result<Option<FallEvent>, DetectionError> {
        self.process_xyz(sample.timestamp_ms, sample.x, sample.y, sample.z)
    }

    /// Process raw axes observed at `now_millis`
    pub fn process_xyz(
        &mut self,
        now_millis: i64,
        x: f64,
        y: f64,
        z: f64,
    ) -> Result<Option<FallEvent>, DetectionError> {
        let ratio = SignalProcessor::gravity_ratio(x, y, z)?;
        Ok(self.process_ratio(now_millis, ratio))
    }

    /// Process an already computed gravity ratio
    pub fn process_ratio(&mut self, now_millis: i64, gravity_ratio: f64) -> Option<FallEvent> {
        let event = self.machine.on_sample(now_millis, gravity_ratio)?;
        self.dispatch(&event);
        Some(event)
    }

    /// Clear any in-flight detection window
    pub fn reset(&mut self) {
        self.machine.reset();
    }

    fn dispatch(&self, event: &FallEvent) {
        match &self.sink {
            Some(sink) => sink.record(event),
            None => debug!(
                duration_millis = event.duration_millis,
                "no sink configured, fall event dropped"
            ),
        }
    }
}

/// Builder for [`FallDetector`]
#[derive(Default)]
pub struct FallDetectorBuilder {
    intensity: Option<Intensity>,
    sink: Option<Arc<dyn FallSink>>,
}

impl FallDetectorBuilder {
    pub fn intensity(mut self, intensity: Intensity) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn sink(mut self, sink: impl FallSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Use an already shared sink, e.g. an `Arc<EventStore>` the caller keeps reading
    pub fn shared_sink(mut self, sink: Arc<dyn FallSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> FallDetector {
        let intensity = self.intensity.unwrap_or_default();
        FallDetector {
            intensity,
            machine: FallStateMachine::new(intensity),
            sink: self.sink,
        }
    }
}
