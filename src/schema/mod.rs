//! Accelerometer sample input schema
//!
//! Samples arrive as NDJSON (one record per line) or as a JSON array of
//! `{"timestamp_ms", "x", "y", "z"}` records.

mod adapter;
mod sample;

pub use adapter::*;
pub use sample::*;
