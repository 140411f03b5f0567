//! Device profiles.
//!
//! A profile is plain data describing one deployment of the binary device
//! protocol: where the fields sit inside a fixed-size record, how far the
//! device clock is off, how verify-mode bytes translate, and how long each
//! protocol phase may take. Nothing here performs I/O.

use crate::error::ConfigError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Byte offsets of the fields inside one record.
///
/// All integer fields are 4-byte little-endian unsigned. The verify mode is a
/// single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOffsets {
    /// Size of one record in bytes.
    pub record_size: usize,
    /// Offset of the subject id.
    pub subject_id: usize,
    /// Offset of the timestamp.
    pub timestamp: usize,
    /// Offset of the work code.
    pub work_code: usize,
    /// Offset of the verify-mode byte.
    pub verify_mode: usize,
    /// Bytes to skip after the acknowledgment header magic.
    #[serde(default = "default_payload_offset")]
    pub payload_offset: usize,
}

fn default_payload_offset() -> usize {
    10
}

/// The record layout used by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLayout {
    /// 20-byte records, timestamp at 7, work code at 15, verify at 19.
    #[default]
    Compact20,
    /// 40-byte records, timestamp at 4, verify at 8, work code at 12.
    Extended40,
    /// Explicit offsets.
    Custom(RecordOffsets),
}

impl RecordLayout {
    /// Returns the field offsets for this layout.
    pub fn offsets(&self) -> RecordOffsets {
        match self {
            RecordLayout::Compact20 => RecordOffsets {
                record_size: 20,
                subject_id: 0,
                timestamp: 7,
                work_code: 15,
                verify_mode: 19,
                payload_offset: 12,
            },
            RecordLayout::Extended40 => RecordOffsets {
                record_size: 40,
                subject_id: 0,
                timestamp: 4,
                work_code: 12,
                verify_mode: 8,
                payload_offset: 10,
            },
            RecordLayout::Custom(offsets) => *offsets,
        }
    }

    /// Checks that every field fits inside a record.
    pub fn validate(&self, source_id: &str) -> Result<(), ConfigError> {
        let o = self.offsets();
        let invalid = |reason: String| ConfigError::InvalidLayout {
            source_id: source_id.to_string(),
            reason,
        };

        if o.record_size == 0 {
            return Err(invalid("record size is zero".into()));
        }
        for (name, offset, width) in [
            ("subject_id", o.subject_id, 4),
            ("timestamp", o.timestamp, 4),
            ("work_code", o.work_code, 4),
            ("verify_mode", o.verify_mode, 1),
        ] {
            if offset + width > o.record_size {
                return Err(invalid(format!(
                    "{name} at {offset} overruns {}-byte record",
                    o.record_size
                )));
            }
        }
        Ok(())
    }
}

/// Per-phase deadlines and pauses of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTimeouts {
    /// TCP connect deadline.
    pub connect_secs: u64,
    /// Handshake reply deadline.
    pub handshake_secs: u64,
    /// Setup reply deadline.
    pub setup_secs: u64,
    /// Deadline for the first data chunk.
    pub data_secs: u64,
    /// Quiet period that ends a multi-chunk data reply.
    pub idle_gap_ms: u64,
    /// Pause between handshake and setup.
    pub handshake_pause_ms: u64,
    /// Pause between setup and data request.
    pub setup_pause_ms: u64,
}

impl Default for DeviceTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            handshake_secs: 5,
            setup_secs: 5,
            data_secs: 20,
            idle_gap_ms: 500,
            handshake_pause_ms: 100,
            setup_pause_ms: 200,
        }
    }
}

impl DeviceTimeouts {
    /// Connect deadline.
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Handshake deadline.
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    /// Setup deadline.
    pub fn setup(&self) -> Duration {
        Duration::from_secs(self.setup_secs)
    }

    /// First data chunk deadline.
    pub fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    /// Idle gap between data chunks.
    pub fn idle_gap(&self) -> Duration {
        Duration::from_millis(self.idle_gap_ms)
    }

    /// Returns a copy with every phase shortened to `limit`. Used by tests
    /// and by `probe`.
    pub fn capped(mut self, limit: Duration) -> Self {
        let secs = limit.as_secs().max(1);
        self.connect_secs = self.connect_secs.min(secs);
        self.handshake_secs = self.handshake_secs.min(secs);
        self.setup_secs = self.setup_secs.min(secs);
        self.data_secs = self.data_secs.min(secs);
        self
    }
}

/// Zone a corrected device timestamp is read in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockZone {
    /// The host's local zone. Site offsets are calibrated against this.
    #[default]
    Local,
    /// UTC, independent of the host.
    Utc,
}

/// Everything needed to talk to and decode one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Record layout.
    pub layout: RecordLayout,
    /// Seconds added to every decoded timestamp.
    pub clock_offset_secs: i64,
    /// Zone the corrected timestamp is read in.
    pub clock_zone: ClockZone,
    /// Subject ids above this are noise.
    pub max_subject_id: u32,
    /// Verify-mode byte (decimal) to method code.
    pub verify_map: BTreeMap<String, String>,
    /// Token used when the setup reply is too short to carry one.
    pub default_token: u8,
    /// Address bytes placed in handshake and setup frames.
    pub address: [u8; 4],
    /// Data replies shorter than this carry no records.
    pub min_data_len: usize,
    /// Phase deadlines.
    pub timeouts: DeviceTimeouts,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        let mut verify_map = BTreeMap::new();
        verify_map.insert("64".to_string(), "1".to_string());
        verify_map.insert("16".to_string(), "1".to_string());

        Self {
            layout: RecordLayout::Compact20,
            clock_offset_secs: 0,
            clock_zone: ClockZone::Local,
            max_subject_id: 100_000_000,
            verify_map,
            default_token: 0x03,
            address: [0xff, 0xff, 0x00, 0x00],
            min_data_len: 100,
            timeouts: DeviceTimeouts::default(),
        }
    }
}

impl DeviceProfile {
    /// Sets the record layout.
    pub fn with_layout(mut self, layout: RecordLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the clock offset.
    pub fn with_clock_offset(mut self, secs: i64) -> Self {
        self.clock_offset_secs = secs;
        self
    }

    /// Sets the zone corrected timestamps are read in.
    pub fn with_clock_zone(mut self, zone: ClockZone) -> Self {
        self.clock_zone = zone;
        self
    }

    /// Sets the default session token.
    pub fn with_default_token(mut self, token: u8) -> Self {
        self.default_token = token;
        self
    }

    /// Sets the phase deadlines.
    pub fn with_timeouts(mut self, timeouts: DeviceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the minimum data reply length.
    pub fn with_min_data_len(mut self, len: usize) -> Self {
        self.min_data_len = len;
        self
    }

    /// Returns true if a subject id is plausible.
    pub fn accepts_subject(&self, subject_id: u32) -> bool {
        subject_id != 0 && subject_id <= self.max_subject_id
    }

    /// Applies the clock offset to a raw device timestamp and reads the
    /// result as epoch seconds in [`clock_zone`](Self::clock_zone).
    ///
    /// Returns `None` when the corrected value is outside chrono's range.
    pub fn corrected_time(&self, raw: u32) -> Option<NaiveDateTime> {
        let secs = i64::from(raw).checked_add(self.clock_offset_secs)?;
        match self.clock_zone {
            ClockZone::Local => Local
                .timestamp_opt(secs, 0)
                .single()
                .map(|dt| dt.naive_local()),
            ClockZone::Utc => DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()),
        }
    }

    /// Maps a verify-mode byte to a method code.
    pub fn verify_method(&self, code: u8) -> String {
        let key = code.to_string();
        self.verify_map.get(&key).cloned().unwrap_or(key)
    }

    /// Validates layout and timing.
    pub fn validate(&self, source_id: &str) -> Result<(), ConfigError> {
        self.layout.validate(source_id)?;
        let t = &self.timeouts;
        if t.handshake_secs == 0 || t.setup_secs == 0 || t.data_secs == 0 || t.connect_secs == 0 {
            return Err(ConfigError::InvalidTiming {
                source_id: source_id.to_string(),
                reason: "phase deadlines must be at least one second".into(),
            });
        }
        for key in self.verify_map.keys() {
            if key.parse::<u8>().is_err() {
                return Err(ConfigError::InvalidLayout {
                    source_id: source_id.to_string(),
                    reason: format!("verify map key {key:?} is not a byte value"),
                });
            }
        }
        Ok(())
    }
}
