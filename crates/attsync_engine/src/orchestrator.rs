//! Pull-cycle driver.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::sink::BatchSink;
use crate::source::{build_connector, CheckpointMode, SourceConnector};
use attsync_core::{AttendanceEvent, CheckpointStore, Position, Settings, SourceLock};
use chrono::{Local, NaiveDateTime};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for the next tick.
    Idle,
    /// Reading a source.
    Fetching,
    /// Writing batches to the sink.
    Writing,
    /// The last source finished cleanly.
    Synced,
    /// The last source failed.
    Error,
}

impl SyncState {
    /// Returns true while a source is being processed.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Fetching | SyncState::Writing)
    }
}

/// Counters across all cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed cycles.
    pub cycles_completed: u64,
    /// Events that passed the checkpoint filter.
    pub events_fetched: u64,
    /// Rows the sink reported as new.
    pub events_written: u64,
    /// Committed batches.
    pub batches_committed: u64,
    /// Source runs that ended in an error.
    pub source_failures: u64,
    /// Wall-clock time of the last completed cycle.
    pub last_sync_time: Option<NaiveDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of one source's run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    /// Source id.
    pub source_id: String,
    /// Raw records returned by the source.
    pub fetched: usize,
    /// Events after normalization and checkpoint filtering.
    pub accepted: usize,
    /// Rows the sink reported as new.
    pub written: usize,
    /// Committed batches.
    pub batches: usize,
    /// Checkpoint after the run, for position-tracked sources.
    pub checkpoint: Option<Position>,
    /// Wall time.
    pub duration: Duration,
}

/// Outcome of one cycle over every source.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Per-source results, in run order.
    pub sources: Vec<(String, SyncResult<SourceReport>)>,
}

impl CycleReport {
    /// Number of sources that failed.
    pub fn failures(&self) -> usize {
        self.sources.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// Rows written across sources.
    pub fn written(&self) -> usize {
        self.sources
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|r| r.written)
            .sum()
    }
}

/// Runs pull cycles: checkpoint, fetch, normalize, batch write, advance.
///
/// The checkpoint of a position-tracked source is saved after every
/// committed batch, to that batch's last event. A failed batch ends the
/// source's run with the checkpoint on the last committed batch, so the next
/// cycle replays from there and the sink's dedup key absorbs the overlap.
///
/// In dry-run mode sources are never committed, so a relocating source keeps
/// its input in place.
pub struct SyncOrchestrator {
    sink: Arc<dyn BatchSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    dry_run: bool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator writing to `sink`.
    pub fn new(sink: Arc<dyn BatchSink>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            sink,
            checkpoints,
            dry_run: false,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Leaves sources uncommitted after a successful run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether sources are left uncommitted.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Counters so far.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The checkpoint store.
    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one source to completion or first error.
    pub fn sync_source(
        &self,
        config: &SyncConfig,
        source: &mut dyn SourceConnector,
    ) -> SyncResult<SourceReport> {
        let start = Instant::now();
        let source_id = source.source_id().to_string();

        let _lock = match &config.lock_dir {
            Some(dir) => Some(SourceLock::try_acquire(dir, &source_id)?),
            None => None,
        };

        let mode = source.checkpoint_mode();
        let mut checkpoint = match mode {
            CheckpointMode::Position => self.checkpoints.load(&source_id)?,
            CheckpointMode::Relocation => None,
        };

        self.set_state(SyncState::Fetching);
        let raws = source.fetch_since(checkpoint.as_ref())?;
        let fetched = raws.len();

        let mut events = source.normalizer().normalize_all(&raws);
        events.sort_by_cached_key(AttendanceEvent::position);
        if let Some(pos) = &checkpoint {
            events.retain(|e| pos.is_before(&e.event_time, &e.sequence_id));
        }
        let accepted = events.len();

        tracing::info!(
            source = %source_id,
            fetched,
            accepted,
            checkpoint = %checkpoint.as_ref().map(|p| p.to_string()).unwrap_or_default(),
            "fetched source"
        );

        self.set_state(SyncState::Writing);
        let mut written = 0;
        let mut batches = 0;
        for (index, batch) in events.chunks(config.batch_size).enumerate() {
            if index > 0 && !config.batch_pause.is_zero() {
                thread::sleep(config.batch_pause);
            }

            let inserted = self.sink.write(batch).map_err(|e| {
                tracing::warn!(source = %source_id, batch = index, size = batch.len(), error = %e, "batch not committed");
                SyncError::from(e)
            })?;
            written += inserted;
            batches += 1;

            if mode == CheckpointMode::Position {
                if let Some(last) = batch.last() {
                    let position = last.position();
                    self.checkpoints.save(&source_id, &position)?;
                    checkpoint = Some(position);
                }
            }

            tracing::debug!(source = %source_id, batch = index, size = batch.len(), inserted, "batch committed");
        }

        if self.dry_run {
            tracing::info!(source = %source_id, "dry run, source not committed");
        } else {
            source.commit()?;
        }

        Ok(SourceReport {
            source_id,
            fetched,
            accepted,
            written,
            batches,
            checkpoint: if mode == CheckpointMode::Position {
                checkpoint
            } else {
                None
            },
            duration: start.elapsed(),
        })
    }

    /// Runs every source in order. A failing source is logged and does not
    /// stop the others.
    pub fn run_cycle(
        &self,
        config: &SyncConfig,
        sources: &mut [Box<dyn SourceConnector>],
    ) -> CycleReport {
        let mut report = CycleReport::default();

        for source in sources.iter_mut() {
            let source_id = source.source_id().to_string();
            let result = self.sync_source(config, source.as_mut());

            let mut stats = self.stats.write();
            match &result {
                Ok(r) => {
                    self.set_state(SyncState::Synced);
                    stats.events_fetched += r.accepted as u64;
                    stats.events_written += r.written as u64;
                    stats.batches_committed += r.batches as u64;
                    tracing::info!(
                        source = %source_id,
                        written = r.written,
                        batches = r.batches,
                        elapsed_ms = r.duration.as_millis() as u64,
                        "source synced"
                    );
                }
                Err(e) => {
                    self.set_state(SyncState::Error);
                    stats.source_failures += 1;
                    stats.last_error = Some(format!("{source_id}: {e}"));
                    tracing::error!(
                        source = %source_id,
                        kind = %e.kind(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "source failed"
                    );
                }
            }
            drop(stats);

            report.sources.push((source_id, result));
        }

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.last_sync_time = Some(Local::now().naive_local());
        }
        self.set_state(SyncState::Idle);
        report
    }

    /// Runs one cycle over the enabled sources of a settings snapshot.
    pub fn run_snapshot(&self, settings: &Settings) -> CycleReport {
        let config = SyncConfig::from_settings(settings);
        let mut sources: Vec<Box<dyn SourceConnector>> =
            settings.enabled_sources().map(build_connector).collect();
        tracing::info!(sources = sources.len(), "starting pull cycle");
        self.run_cycle(&config, &mut sources)
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("state", &self.state())
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use attsync_core::{MemoryCheckpointStore, RawEvent, RecordNormalizer, SourceRow};
    use chrono::NaiveDate;

    struct VecSource {
        rows: Vec<SourceRow>,
        normalizer: RecordNormalizer,
    }

    impl SourceConnector for VecSource {
        fn source_id(&self) -> &str {
            "vec"
        }

        fn checkpoint_mode(&self) -> CheckpointMode {
            CheckpointMode::Position
        }

        fn normalizer(&self) -> &RecordNormalizer {
            &self.normalizer
        }

        fn fetch_since(&mut self, _since: Option<&Position>) -> SyncResult<Vec<RawEvent>> {
            Ok(self.rows.iter().cloned().map(RawEvent::Row).collect())
        }
    }

    fn row(badge: &str, sec: u32, sn: &str) -> SourceRow {
        SourceRow {
            badge: badge.into(),
            check_time: NaiveDate::from_ymd_opt(2026, 1, 10)
                .unwrap()
                .and_hms_opt(9, 0, sec)
                .unwrap(),
            check_type: None,
            verify_code: None,
            sensor_id: None,
            work_code: None,
            sn: Some(sn.into()),
        }
    }

    #[test]
    fn state_checks() {
        assert!(SyncState::Fetching.is_active());
        assert!(SyncState::Writing.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Error.is_active());
    }

    #[test]
    fn unordered_source_is_sorted_before_writing() {
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryCheckpointStore::new());
        let orchestrator = SyncOrchestrator::new(sink.clone(), store.clone());

        let mut source = VecSource {
            rows: vec![row("1", 5, "3"), row("2", 0, "10"), row("3", 0, "9")],
            normalizer: RecordNormalizer::new("HIP_ACCESS_DB"),
        };
        let config = SyncConfig::new()
            .with_batch_size(2)
            .with_batch_pause(Duration::ZERO);
        let report = orchestrator.sync_source(&config, &mut source).unwrap();

        assert_eq!(report.batches, 2);
        let saved: Vec<String> = store.history().iter().map(|(_, p)| p.to_string()).collect();
        assert_eq!(saved, vec!["2026-01-10 09:00:00|10", "2026-01-10 09:00:05|3"]);
    }

    struct CommitCounter {
        inner: VecSource,
        commits: usize,
    }

    impl SourceConnector for CommitCounter {
        fn source_id(&self) -> &str {
            "counted"
        }

        fn checkpoint_mode(&self) -> CheckpointMode {
            CheckpointMode::Relocation
        }

        fn normalizer(&self) -> &RecordNormalizer {
            self.inner.normalizer()
        }

        fn fetch_since(&mut self, since: Option<&Position>) -> SyncResult<Vec<RawEvent>> {
            self.inner.fetch_since(since)
        }

        fn commit(&mut self) -> SyncResult<()> {
            self.commits += 1;
            Ok(())
        }
    }

    #[test]
    fn dry_run_skips_commit() {
        let sink = Arc::new(MemorySink::new());
        let config = SyncConfig::new().with_batch_pause(Duration::ZERO);
        let mut source = CommitCounter {
            inner: VecSource {
                rows: vec![row("1", 0, "1")],
                normalizer: RecordNormalizer::new("X"),
            },
            commits: 0,
        };

        let dry = SyncOrchestrator::new(sink.clone(), Arc::new(MemoryCheckpointStore::new()))
            .with_dry_run(true);
        assert!(dry.is_dry_run());
        let report = dry.sync_source(&config, &mut source).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(source.commits, 0);

        let live = SyncOrchestrator::new(sink, Arc::new(MemoryCheckpointStore::new()));
        live.sync_source(&config, &mut source).unwrap();
        assert_eq!(source.commits, 1);
    }

    #[test]
    fn stats_track_failures() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_on_call(0);
        let orchestrator =
            SyncOrchestrator::new(sink.clone(), Arc::new(MemoryCheckpointStore::new()));

        let mut sources: Vec<Box<dyn SourceConnector>> = vec![Box::new(VecSource {
            rows: vec![row("1", 0, "1")],
            normalizer: RecordNormalizer::new("X"),
        })];
        let config = SyncConfig::new().with_batch_pause(Duration::ZERO);

        let report = orchestrator.run_cycle(&config, &mut sources);
        assert_eq!(report.failures(), 1);
        let stats = orchestrator.stats();
        assert_eq!(stats.source_failures, 1);
        assert_eq!(stats.cycles_completed, 1);
        assert!(stats.last_error.unwrap().starts_with("vec:"));
        assert_eq!(orchestrator.state(), SyncState::Idle);

        let report = orchestrator.run_cycle(&config, &mut sources);
        assert_eq!(report.failures(), 0);
        assert_eq!(report.written(), 1);
        assert_eq!(orchestrator.stats().events_written, 1);
    }
}
