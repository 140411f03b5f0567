//! Pull sources.
//!
//! Every pull source implements [`SourceConnector`]: given the last committed
//! position it returns the raw records that come after it, in ascending
//! `(event_time, sequence)` order.
//!
//! Sources track progress in one of two ways:
//!
//! - [`CheckpointMode::Position`]: the orchestrator saves the position of the
//!   last event of every committed batch (relational store, device)
//! - [`CheckpointMode::Relocation`]: the source moves what it consumed out of
//!   the way in [`commit`](SourceConnector::commit) (text log directory)

mod device;
mod flat_file;
mod relational;

pub use device::DeviceSource;
pub use flat_file::{parse_log_line, FlatFileLog};
pub use relational::RelationalPoll;

use crate::error::SyncResult;
use attsync_core::{Position, RawEvent, RecordNormalizer, SourceKind, SourceSettings};

/// How a source remembers what it already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// A persisted [`Position`].
    Position,
    /// Consumed input is moved away on commit.
    Relocation,
}

/// A pull source.
pub trait SourceConnector: Send {
    /// Stable id, also the checkpoint key.
    fn source_id(&self) -> &str;

    /// How progress is tracked.
    fn checkpoint_mode(&self) -> CheckpointMode;

    /// Normalizer for this source's records.
    fn normalizer(&self) -> &RecordNormalizer;

    /// Returns records after `since` (all records when `None`), ascending.
    fn fetch_since(&mut self, since: Option<&Position>) -> SyncResult<Vec<RawEvent>>;

    /// Called once every fetched record has been committed to the sink.
    fn commit(&mut self) -> SyncResult<()> {
        Ok(())
    }
}

/// Builds the connector for one configured source.
pub fn build_connector(settings: &SourceSettings) -> Box<dyn SourceConnector> {
    match &settings.kind {
        SourceKind::Relational(r) => Box::new(RelationalPoll::new(&settings.id, r)),
        SourceKind::FlatFile(f) => Box::new(FlatFileLog::new(&settings.id, f)),
        SourceKind::Device(d) => Box::new(DeviceSource::new(&settings.id, d)),
    }
}
