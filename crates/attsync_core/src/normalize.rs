//! Mapping raw source records onto [`AttendanceEvent`].

use crate::error::{CoreError, CoreResult};
use crate::event::{AttendanceEvent, EventType};
use crate::position::SequenceId;
use crate::profile::DeviceProfile;
use crate::raw::{DeviceRecord, LogLine, PushLine, RawEvent, SourceRow};

/// Turns raw records from one source into canonical events.
///
/// A normalizer is built per source. The serial is used for every record
/// that does not carry its own: log lines, device records, rows with an
/// empty `sn` and push lines without a serial.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    serial: String,
    profile: DeviceProfile,
}

impl RecordNormalizer {
    /// Creates a normalizer for a source whose events belong to `serial`.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            profile: DeviceProfile::default(),
        }
    }

    /// Uses `profile` for clock correction and verify-mode mapping.
    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Returns the serial this normalizer assigns.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Normalizes one raw record.
    pub fn normalize(&self, raw: &RawEvent) -> CoreResult<AttendanceEvent> {
        match raw {
            RawEvent::Row(row) => self.from_row(row),
            RawEvent::LogLine(line) => self.from_log_line(line),
            RawEvent::Device(record) => self.from_device(record),
            RawEvent::Push(line) => self.from_push(line),
        }
    }

    /// Normalizes a batch, dropping and logging records that fail.
    pub fn normalize_all(&self, raws: &[RawEvent]) -> Vec<AttendanceEvent> {
        raws.iter()
            .filter_map(|raw| match self.normalize(raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(serial = %self.serial, kind = %e.kind(), error = %e, "skipping record");
                    None
                }
            })
            .collect()
    }

    fn from_row(&self, row: &SourceRow) -> CoreResult<AttendanceEvent> {
        let badge = row.badge.trim();
        if badge.is_empty() {
            return Err(CoreError::decode("row without badge number"));
        }

        let serial = non_empty(&row.sn).unwrap_or(self.serial.as_str());

        Ok(AttendanceEvent {
            device_serial: serial.to_string(),
            subject_id: badge.to_string(),
            event_time: row.check_time,
            event_type: EventType::from_code(non_empty(&row.check_type).unwrap_or("0")),
            verify_method: non_empty(&row.verify_code).unwrap_or("1").to_string(),
            work_code: non_empty(&row.work_code).map(str::to_string),
            sequence_id: SequenceId::new(row.sn.clone().unwrap_or_default()),
            raw_payload: row.raw_line().into_bytes(),
        })
    }

    fn from_log_line(&self, line: &LogLine) -> CoreResult<AttendanceEvent> {
        if line.badge.trim().is_empty() {
            return Err(CoreError::decode(format!(
                "{}:{} has no badge",
                line.file, line.line_no
            )));
        }

        Ok(AttendanceEvent {
            device_serial: self.serial.clone(),
            subject_id: line.badge.trim().to_string(),
            event_time: line.time,
            event_type: EventType::CheckIn,
            verify_method: "1".to_string(),
            work_code: None,
            sequence_id: SequenceId::new(line.seq.as_str()),
            raw_payload: line.raw.clone().into_bytes(),
        })
    }

    fn from_device(&self, record: &DeviceRecord) -> CoreResult<AttendanceEvent> {
        if !self.profile.accepts_subject(record.subject_id) {
            return Err(CoreError::decode(format!(
                "record {} has implausible subject id {}",
                record.index, record.subject_id
            )));
        }

        let event_time = self.profile.corrected_time(record.timestamp).ok_or_else(|| {
            CoreError::decode(format!(
                "record {} timestamp {} out of range",
                record.index, record.timestamp
            ))
        })?;

        Ok(AttendanceEvent {
            device_serial: self.serial.clone(),
            subject_id: record.subject_id.to_string(),
            event_time,
            event_type: EventType::CheckIn,
            verify_method: self.profile.verify_method(record.verify_mode),
            work_code: Some(record.work_code.to_string()),
            sequence_id: SequenceId::from(record.index),
            raw_payload: hex::encode(&record.raw).into_bytes(),
        })
    }

    fn from_push(&self, line: &PushLine) -> CoreResult<AttendanceEvent> {
        let serial = if line.serial.trim().is_empty() {
            self.serial.clone()
        } else {
            line.serial.trim().to_string()
        };

        Ok(AttendanceEvent {
            device_serial: serial,
            subject_id: line.subject_id.clone(),
            event_time: line.time,
            event_type: EventType::from_code(&line.check_type),
            verify_method: line.verify_type.clone(),
            work_code: Some(line.work_code.clone()).filter(|w| !w.is_empty()),
            sequence_id: SequenceId::empty(),
            raw_payload: line.raw.clone().into_bytes(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
