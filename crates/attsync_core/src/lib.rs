//! # attsync core
//!
//! Shared building blocks of the attendance sync engine.
//!
//! This crate provides:
//! - The canonical [`AttendanceEvent`] and its dedup identity
//! - [`Position`] checkpoints with time-then-sequence ordering
//! - [`RecordNormalizer`] for every raw source shape
//! - Durable [`CheckpointStore`]s and per-source lock files
//! - [`DeviceProfile`] describing a binary-protocol deployment
//! - The TOML [`Settings`] snapshot and [`ConfigProvider`]
//! - Encrypted sink [`credentials`]
//!
//! Nothing in this crate opens a socket.
//!
//! ## Key Invariants
//!
//! - A checkpoint save either fully replaces the old value or leaves it intact
//! - Events are immutable once normalized
//! - Two events are the same punch iff `(serial, subject, time)` match

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod config;
pub mod credentials;
mod error;
mod event;
mod lock;
mod normalize;
mod position;
mod profile;
mod raw;

pub use checkpoint::{
    validate_source_id, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use config::{
    ConfigProvider, CredentialSettings, DeviceSettings, FileConfigProvider, FlatFileSettings,
    PushOptions, PushSettings, RelationalSettings, ScheduleSettings, Settings, SinkSettings,
    SourceKind, SourceSettings, StaticConfigProvider,
};
pub use credentials::{CredentialProvider, SinkCredentials, StaticCredentials};
pub use error::{ConfigError, CoreError, CoreResult, ErrorKind};
pub use event::{AttendanceEvent, DedupKey, EventType};
pub use lock::SourceLock;
pub use normalize::RecordNormalizer;
pub use position::{parse_time, ParsePositionError, Position, SequenceId, TIME_FORMAT};
pub use profile::{ClockZone, DeviceProfile, DeviceTimeouts, RecordLayout, RecordOffsets};
pub use raw::{DeviceRecord, LogLine, PushLine, RawEvent, SourceRow};
