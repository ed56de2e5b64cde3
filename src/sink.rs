//! Event sinks
//!
//! A sink receives every confirmed [`FallEvent`]. Storage and user
//! notification live behind this trait; the detector only produces events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::types::FallEvent;

/// Receiver for confirmed falls
pub trait FallSink: Send + Sync {
    fn record(&self, event: &FallEvent);
}

impl<F> FallSink for F
where
    F: Fn(&FallEvent) + Send + Sync,
{
    fn record(&self, event: &FallEvent) {
        self(event)
    }
}

/// A fall as kept by [`EventStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFall {
    pub id: Uuid,
    /// Wall-clock time the event reached the store
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: FallEvent,
}

/// Thread-safe in-memory record of confirmed falls
#[derive(Debug, Default)]
pub struct EventStore {
    records: Mutex<Vec<RecordedFall>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event and return the record that was created
    pub fn insert(&self, event: FallEvent) -> RecordedFall {
        let record = RecordedFall {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            event,
        };
        self.lock().push(record.clone());
        record
    }

    /// All records in insertion order
    pub fn all(&self) -> Vec<RecordedFall> {
        self.lock().clone()
    }

    /// Remove a record; returns whether it existed
    pub fn delete(&self, id: Uuid) -> bool {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|r| r.id != id);
        records.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedFall>> {
        // Poisoning only means a sink caller panicked; the records are intact
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FallSink for EventStore {
    fn record(&self, event: &FallEvent) {
        self.insert(*event);
    }
}
