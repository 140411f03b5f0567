//! The canonical attendance event.

use crate::position::{Position, SequenceId, TIME_FORMAT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an attendance punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Subject checked in.
    CheckIn,
    /// Subject checked out.
    CheckOut,
    /// Source did not say.
    Unknown,
}

impl EventType {
    /// Maps a source check-type code onto an event type.
    ///
    /// `0`/`I` mean check-in, `1`/`O` mean check-out; anything else is
    /// unknown.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" | "I" | "i" => EventType::CheckIn,
            "1" | "O" | "o" => EventType::CheckOut,
            _ => EventType::Unknown,
        }
    }

    /// Returns the single-letter code stored in the sink.
    pub fn as_code(&self) -> &'static str {
        match self {
            EventType::CheckIn => "I",
            EventType::CheckOut => "O",
            EventType::Unknown => "",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Identity of an event for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    /// Device serial.
    pub device_serial: String,
    /// Badge / user id.
    pub subject_id: String,
    /// Event time.
    pub event_time: NaiveDateTime,
}

/// A normalized attendance event.
///
/// Events are created by [`RecordNormalizer`](crate::RecordNormalizer) and
/// are never mutated afterwards. Two events with the same
/// [`dedup_key`](Self::dedup_key) are the same punch, whatever their payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    /// Serial of the device that recorded the punch.
    pub device_serial: String,
    /// Badge / user id.
    pub subject_id: String,
    /// Event time on the source clock.
    pub event_time: NaiveDateTime,
    /// Check-in / check-out.
    pub event_type: EventType,
    /// Verification method code.
    pub verify_method: String,
    /// Work code, if the source carries one.
    pub work_code: Option<String>,
    /// Source-local tie-break id.
    pub sequence_id: SequenceId,
    /// The original line or record bytes.
    pub raw_payload: Vec<u8>,
}

impl AttendanceEvent {
    /// Returns the deduplication key.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            device_serial: self.device_serial.clone(),
            subject_id: self.subject_id.clone(),
            event_time: self.event_time,
        }
    }

    /// Returns the checkpoint position of this event.
    pub fn position(&self) -> Position {
        Position::new(self.event_time, self.sequence_id.clone())
    }

    /// Returns the raw payload as text, replacing invalid UTF-8.
    pub fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_payload).into_owned()
    }

    /// Formats the event time the way the sink stores it.
    pub fn event_time_string(&self) -> String {
        self.event_time.format(TIME_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(payload: &str) -> AttendanceEvent {
        AttendanceEvent {
            device_serial: "SN1".into(),
            subject_id: "100".into(),
            event_time: NaiveDate::from_ymd_opt(2026, 1, 10)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            event_type: EventType::CheckIn,
            verify_method: "1".into(),
            work_code: None,
            sequence_id: SequenceId::from("7"),
            raw_payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn event_type_codes() {
        assert_eq!(EventType::from_code("0"), EventType::CheckIn);
        assert_eq!(EventType::from_code("I"), EventType::CheckIn);
        assert_eq!(EventType::from_code(" o "), EventType::CheckOut);
        assert_eq!(EventType::from_code("5"), EventType::Unknown);
        assert_eq!(EventType::CheckOut.as_code(), "O");
    }

    #[test]
    fn dedup_key_ignores_payload() {
        let a = event("first");
        let b = event("second");
        assert_ne!(a, b);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn position_and_time_string() {
        let e = event("x");
        assert_eq!(e.position().to_string(), "2026-01-10 08:00:00|7");
        assert_eq!(e.event_time_string(), "2026-01-10 08:00:00");
    }
}
