//! Binary-protocol device pull.

use super::{CheckpointMode, SourceConnector};
use crate::error::SyncResult;
use attsync_core::{
    DeviceProfile, DeviceRecord, DeviceSettings, Position, RawEvent, RecordNormalizer, SequenceId,
};
use attsync_device::DeviceClient;
use chrono::NaiveDateTime;

/// Pulls the device log over one session per fetch.
///
/// The device always returns its whole log. Records are ordered by corrected
/// time with their index in the reply as tie-break, and everything at or
/// before the checkpoint is dropped here.
#[derive(Debug)]
pub struct DeviceSource {
    id: String,
    client: DeviceClient,
    normalizer: RecordNormalizer,
}

impl DeviceSource {
    /// Creates a connector from settings.
    pub fn new(id: &str, settings: &DeviceSettings) -> Self {
        Self {
            id: id.to_string(),
            client: DeviceClient::new(settings.address(), settings.profile.clone()),
            normalizer: RecordNormalizer::new(settings.serial())
                .with_profile(settings.profile.clone()),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &DeviceClient {
        &self.client
    }
}

impl SourceConnector for DeviceSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn checkpoint_mode(&self) -> CheckpointMode {
        CheckpointMode::Position
    }

    fn normalizer(&self) -> &RecordNormalizer {
        &self.normalizer
    }

    fn fetch_since(&mut self, since: Option<&Position>) -> SyncResult<Vec<RawEvent>> {
        let outcome = self.client.pull()?;
        let records = after_checkpoint(&self.id, self.client.profile(), outcome.reply.records, since);

        tracing::debug!(
            source = %self.id,
            token = outcome.token,
            new = records.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "device records after checkpoint"
        );

        Ok(records.into_iter().map(RawEvent::Device).collect())
    }
}

/// Orders records by corrected time and reply index and drops those at or
/// before `since`. Records whose corrected time is out of range are logged
/// and dropped.
fn after_checkpoint(
    source_id: &str,
    profile: &DeviceProfile,
    records: Vec<DeviceRecord>,
    since: Option<&Position>,
) -> Vec<DeviceRecord> {
    let mut kept: Vec<(NaiveDateTime, DeviceRecord)> = records
        .into_iter()
        .filter_map(|record| match profile.corrected_time(record.timestamp) {
            Some(time) => Some((time, record)),
            None => {
                tracing::warn!(
                    source = %source_id,
                    index = record.index,
                    timestamp = record.timestamp,
                    offset = profile.clock_offset_secs,
                    "skipping record with out-of-range time"
                );
                None
            }
        })
        .filter(|(time, record)| match since {
            Some(pos) => pos.is_before(time, &SequenceId::from(record.index)),
            None => true,
        })
        .collect();
    kept.sort_by_key(|(time, record)| (*time, record.index));
    kept.into_iter().map(|(_, record)| record).collect()
}
