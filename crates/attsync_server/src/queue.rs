//! Pending push events.

use attsync_core::AttendanceEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// FIFO buffer between request handlers and the flush loop.
///
/// The lock is held only to append or to swap the contents out, never
/// across a sink write.
#[derive(Debug, Default)]
pub struct PendingQueue {
    events: Mutex<VecDeque<AttendanceEvent>>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends events at the back.
    pub fn push_many(&self, events: impl IntoIterator<Item = AttendanceEvent>) {
        self.events.lock().extend(events);
    }

    /// Takes everything, leaving the queue empty.
    pub fn take_all(&self) -> Vec<AttendanceEvent> {
        let drained = std::mem::take(&mut *self.events.lock());
        drained.into()
    }

    /// Puts events back in front of anything queued meanwhile, keeping their
    /// order.
    pub fn requeue_front(&self, events: Vec<AttendanceEvent>) {
        let mut queue = self.events.lock();
        for event in events.into_iter().rev() {
            queue.push_front(event);
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::{EventType, SequenceId};
    use chrono::NaiveDate;

    fn event(subject: &str) -> AttendanceEvent {
        AttendanceEvent {
            device_serial: "CQZ7".into(),
            subject_id: subject.into(),
            event_time: NaiveDate::from_ymd_opt(2026, 1, 10)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            event_type: EventType::CheckIn,
            verify_method: "1".into(),
            work_code: None,
            sequence_id: SequenceId::empty(),
            raw_payload: Vec::new(),
        }
    }

    fn subjects(events: &[AttendanceEvent]) -> Vec<&str> {
        events.iter().map(|e| e.subject_id.as_str()).collect()
    }

    #[test]
    fn take_all_empties() {
        let queue = PendingQueue::new();
        queue.push_many([event("1"), event("2")]);
        assert_eq!(queue.len(), 2);

        let taken = queue.take_all();
        assert_eq!(subjects(&taken), vec!["1", "2"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_goes_before_newer_events() {
        let queue = PendingQueue::new();
        queue.push_many([event("1"), event("2")]);
        let taken = queue.take_all();

        queue.push_many([event("3")]);
        queue.requeue_front(taken);

        assert_eq!(subjects(&queue.take_all()), vec!["1", "2", "3"]);
    }
}
