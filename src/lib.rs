//! Synheart Fall - On-device fall detection from accelerometer streams
//!
//! Fall turns a stream of raw 3-axis accelerometer readings into confirmed
//! fall events through a deterministic pipeline: gravity-ratio signal
//! processing → free-fall onset → landing spike → settled stillness.
//!
//! ## Modules
//!
//! - **Detector**: Synchronous state machine and pipeline, driven sample by sample
//! - **Monitor**: Tokio task that adds scheduled re-checks of an open window
//! - **Sinks**: Where confirmed events go (closures, in-memory store)

pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod schema;
pub mod signal;
pub mod sink;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{DetectorConfig, LoggingConfig};
pub use detector::{FallStateMachine, FREE_FALL_THRESHOLD};
pub use error::DetectionError;
pub use monitor::{Clock, FallMonitor, ManualClock, MonitorHandle, MonotonicClock};
pub use pipeline::{detect_falls, detect_falls_ndjson, FallDetector, FallDetectorBuilder};
pub use schema::SampleAdapter;
pub use signal::{SignalProcessor, STANDARD_GRAVITY};
pub use sink::{EventStore, FallSink, RecordedFall};
pub use types::{AccelSample, DetectionState, DetectionWindow, FallEvent, Intensity, IntensityProfile};

/// Library version
pub const FALL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-fall";
