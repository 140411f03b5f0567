//! Source-specific raw records, before normalization.

use chrono::NaiveDateTime;

/// A row read from the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Badge number.
    pub badge: String,
    /// Check time.
    pub check_time: NaiveDateTime,
    /// Check type code, if set.
    pub check_type: Option<String>,
    /// Verify code, if set.
    pub verify_code: Option<String>,
    /// Sensor id, if set.
    pub sensor_id: Option<String>,
    /// Work code, if set.
    pub work_code: Option<String>,
    /// Device serial column, also the ordering tie-break.
    pub sn: Option<String>,
}

impl SourceRow {
    /// Renders the row the way it is archived in the sink's raw column.
    pub fn raw_line(&self) -> String {
        fn opt(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("None")
        }
        format!(
            "Badge:{}|CheckTime:{}|Type:{}|Verify:{}|Sensor:{}|WorkCode:{}|SN:{}",
            self.badge,
            self.check_time,
            opt(&self.check_type),
            opt(&self.verify_code),
            opt(&self.sensor_id),
            opt(&self.work_code),
            opt(&self.sn),
        )
    }
}

/// A line parsed from an exported text log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// File the line came from.
    pub file: String,
    /// 1-based line number.
    pub line_no: usize,
    /// Sequence column.
    pub seq: String,
    /// Badge number.
    pub badge: String,
    /// Punch time.
    pub time: NaiveDateTime,
    /// Status column.
    pub status: String,
    /// Untouched line text.
    pub raw: String,
}

/// A fixed-size record decoded from the device protocol.
///
/// The timestamp is the raw device value; clock correction happens during
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Position of the record in the data reply.
    pub index: u64,
    /// Subject id.
    pub subject_id: u32,
    /// Raw device timestamp (seconds).
    pub timestamp: u32,
    /// Work code.
    pub work_code: u32,
    /// Verify-mode byte.
    pub verify_mode: u8,
    /// The record bytes.
    pub raw: Vec<u8>,
}

/// An attendance line received over the push protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushLine {
    /// Serial of the uploading device.
    pub serial: String,
    /// Subject id.
    pub subject_id: String,
    /// Punch time.
    pub time: NaiveDateTime,
    /// Check type column.
    pub check_type: String,
    /// Verify type column.
    pub verify_type: String,
    /// Work code column.
    pub work_code: String,
    /// Untouched line text.
    pub raw: String,
}

/// A raw event from any source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// Relational store row.
    Row(SourceRow),
    /// Text log line.
    LogLine(LogLine),
    /// Binary device record.
    Device(DeviceRecord),
    /// Push protocol line.
    Push(PushLine),
}

impl From<SourceRow> for RawEvent {
    fn from(row: SourceRow) -> Self {
        RawEvent::Row(row)
    }
}

impl From<LogLine> for RawEvent {
    fn from(line: LogLine) -> Self {
        RawEvent::LogLine(line)
    }
}

impl From<DeviceRecord> for RawEvent {
    fn from(record: DeviceRecord) -> Self {
        RawEvent::Device(record)
    }
}

impl From<PushLine> for RawEvent {
    fn from(line: PushLine) -> Self {
        RawEvent::Push(line)
    }
}
