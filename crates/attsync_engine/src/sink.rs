//! Batch sinks.

use crate::error::{SinkError, SinkResult};
use attsync_core::{AttendanceEvent, DedupKey};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Idempotent, batched writer to the central store.
///
/// A write either commits the whole batch or nothing. Events whose
/// `(device_serial, subject_id, event_time)` is already stored are ignored,
/// so replaying a batch after a crash is harmless.
pub trait BatchSink: Send + Sync {
    /// Writes a batch and returns how many rows were new.
    fn write(&self, events: &[AttendanceEvent]) -> SinkResult<usize>;
}

impl<T: BatchSink + ?Sized> BatchSink for Arc<T> {
    fn write(&self, events: &[AttendanceEvent]) -> SinkResult<usize> {
        (**self).write(events)
    }
}

/// In-memory sink keyed on the dedup identity. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<BTreeMap<DedupKey, AttendanceEvent>>,
    calls: Mutex<Vec<usize>>,
    fail_calls: Mutex<Vec<usize>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `n`th write (0-based, counting every call) fail.
    pub fn fail_on_call(&self, n: usize) {
        self.fail_calls.lock().push(n);
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Stored rows in key order.
    pub fn rows(&self) -> Vec<AttendanceEvent> {
        self.rows.lock().values().cloned().collect()
    }

    /// Batch sizes of every write attempt, failed ones included.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }
}

impl BatchSink for MemorySink {
    fn write(&self, events: &[AttendanceEvent]) -> SinkResult<usize> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(events.len());
            calls.len() - 1
        };

        if self.fail_calls.lock().contains(&call) {
            return Err(SinkError::Rejected(format!("injected failure on call {call}")));
        }

        let mut rows = self.rows.lock();
        let mut inserted = 0;
        for event in events {
            rows.entry(event.dedup_key()).or_insert_with(|| {
                inserted += 1;
                event.clone()
            });
        }
        Ok(inserted)
    }
}
