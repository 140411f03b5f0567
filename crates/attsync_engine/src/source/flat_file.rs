//! Exported text log directory.

use super::{CheckpointMode, SourceConnector};
use crate::error::{SyncError, SyncResult};
use attsync_core::{FlatFileSettings, LogLine, Position, RawEvent, RecordNormalizer};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

const LINE_TIME_FORMAT: &str = "%d/%m/%Y %I:%M:%S %p";

/// Parses one exported log line.
///
/// Lines are whitespace separated: `seq badge dd/mm/yyyy hh:mm:ss AM|PM
/// status ...`. Blank lines, separator lines and the export header yield
/// `None`, as do lines with too few fields or an unreadable time.
pub fn parse_log_line(file: &str, line_no: usize, line: &str) -> Option<LogLine> {
    let line = line.trim();
    if line.is_empty() || line.contains("---") || line.contains("Date Export") {
        return None;
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 6 {
        return None;
    }

    let stamp = format!("{} {} {}", parts[2], parts[3], parts[4]);
    let time = NaiveDateTime::parse_from_str(&stamp, LINE_TIME_FORMAT).ok()?;

    Some(LogLine {
        file: file.to_string(),
        line_no,
        seq: parts[0].to_string(),
        badge: parts[1].to_string(),
        time,
        status: parts[5].to_string(),
        raw: line.to_string(),
    })
}

/// Reads every log file in a directory and archives it once committed.
///
/// No position is kept: a file is delivered in full on each fetch until
/// [`commit`](SourceConnector::commit) moves it to the processed directory.
/// Re-delivery after a failed cycle is absorbed by the sink's dedup key.
/// Files older than the cutoff are skipped unread and archived on the same
/// commit; nothing is moved before it.
#[derive(Debug)]
pub struct FlatFileLog {
    id: String,
    dir: PathBuf,
    processed: PathBuf,
    extension: String,
    cutoff: Option<NaiveDate>,
    normalizer: RecordNormalizer,
    pending: Vec<PathBuf>,
    stale: Vec<PathBuf>,
}

impl FlatFileLog {
    /// Creates a connector from settings.
    pub fn new(id: &str, settings: &FlatFileSettings) -> Self {
        Self {
            id: id.to_string(),
            dir: settings.dir.clone(),
            processed: settings.processed_dir(),
            extension: settings.extension.trim_start_matches('.').to_string(),
            cutoff: settings.ignore_files_before,
            normalizer: RecordNormalizer::new(&settings.device_serial),
            pending: Vec::new(),
            stale: Vec::new(),
        }
    }

    /// Files read by the last fetch and not yet archived.
    pub fn pending(&self) -> &[PathBuf] {
        &self.pending
    }

    fn list_files(&self) -> SyncResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            SyncError::Connection(format!("log directory {}: {e}", self.dir.display()))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SyncError::Connection(e.to_string()))?
                .path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
            if path.is_file() && matches_ext {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_stale(&self, path: &Path) -> bool {
        let Some(cutoff) = self.cutoff else {
            return false;
        };
        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        let Ok(stamp) = meta.created().or_else(|_| meta.modified()) else {
            return false;
        };
        DateTime::<Local>::from(stamp).date_naive() < cutoff
    }

    fn archive(&self, path: &Path) -> SyncResult<()> {
        let Some(name) = path.file_name() else {
            return Ok(());
        };
        fs::create_dir_all(&self.processed)
            .map_err(|e| SyncError::source(&self.id, format!("processed directory: {e}")))?;
        fs::rename(path, self.processed.join(name))
            .map_err(|e| SyncError::source(&self.id, format!("moving {}: {e}", path.display())))
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl SourceConnector for FlatFileLog {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn checkpoint_mode(&self) -> CheckpointMode {
        CheckpointMode::Relocation
    }

    fn normalizer(&self) -> &RecordNormalizer {
        &self.normalizer
    }

    fn fetch_since(&mut self, _since: Option<&Position>) -> SyncResult<Vec<RawEvent>> {
        self.pending.clear();
        self.stale.clear();
        let mut events = Vec::new();

        for path in self.list_files()? {
            let label = file_label(&path);

            if self.is_stale(&path) {
                tracing::info!(source = %self.id, file = %label, "skipping file older than cutoff");
                self.stale.push(path);
                continue;
            }

            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(source = %self.id, file = %label, error = %e, "leaving unreadable file in place");
                    continue;
                }
            };

            let before = events.len();
            events.extend(
                text.lines()
                    .enumerate()
                    .filter_map(|(i, line)| parse_log_line(&label, i + 1, line))
                    .map(RawEvent::LogLine),
            );
            tracing::debug!(source = %self.id, file = %label, lines = events.len() - before, "read log file");
            self.pending.push(path);
        }

        Ok(events)
    }

    fn commit(&mut self) -> SyncResult<()> {
        for path in std::mem::take(&mut self.stale) {
            if let Err(e) = self.archive(&path) {
                tracing::warn!(source = %self.id, file = %file_label(&path), error = %e, "could not archive old file");
            }
        }
        for path in std::mem::take(&mut self.pending) {
            self.archive(&path)?;
            tracing::info!(source = %self.id, file = %file_label(&path), "moved file to processed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn settings(dir: &Path) -> FlatFileSettings {
        FlatFileSettings {
            dir: dir.to_path_buf(),
            extension: "txt".into(),
            device_serial: "HIP_DEVICE_1".into(),
            ignore_files_before: None,
            processed_dir: None,
        }
    }

    #[test]
    fn parses_twelve_hour_lines() {
        let line = parse_log_line("a.txt", 4, "  12  1001  03/01/2026  01:15:00  PM  0  1 ").unwrap();
        assert_eq!(line.seq, "12");
        assert_eq!(line.badge, "1001");
        assert_eq!(line.status, "0");
        assert_eq!(line.time.to_string(), "2026-01-03 13:15:00");
        assert_eq!(line.raw, "12  1001  03/01/2026  01:15:00  PM  0  1");

        let midnight = parse_log_line("a.txt", 5, "1 7 03/01/2026 12:05:00 AM 0").unwrap();
        assert_eq!(midnight.time.to_string(), "2026-01-03 00:05:00");
    }

    #[test]
    fn skips_noise_lines() {
        assert!(parse_log_line("a", 1, "").is_none());
        assert!(parse_log_line("a", 1, "----------------").is_none());
        assert!(parse_log_line("a", 1, "Date Export : 03/01/2026 01:15:00 PM x").is_none());
        assert!(parse_log_line("a", 1, "1 2 03/01/2026 01:15:00").is_none());
        assert!(parse_log_line("a", 1, "1 2 31/02/2026 01:15:00 PM 0").is_none());
    }

    #[test]
    fn files_move_only_on_commit() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("b.txt"),
            "Date Export 03/01/2026\n---\n1 100 03/01/2026 08:00:00 AM 0\n2 101 03/01/2026 08:01:00 AM 0\n",
        )
        .unwrap();
        fs::write(temp.path().join("a.txt"), "9 55 02/01/2026 05:00:00 PM 0\n").unwrap();
        fs::write(temp.path().join("notes.md"), "ignored").unwrap();

        let mut log = FlatFileLog::new("alog", &settings(temp.path()));
        let events = log.fetch_since(None).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(log.pending().len(), 2);
        match &events[0] {
            RawEvent::LogLine(line) => assert_eq!(line.file, "a.txt"),
            other => panic!("unexpected {other:?}"),
        }

        // A failed cycle leaves everything in place.
        assert!(temp.path().join("a.txt").exists());
        assert_eq!(log.fetch_since(None).unwrap().len(), 3);

        log.commit().unwrap();
        assert!(!temp.path().join("a.txt").exists());
        assert!(temp.path().join("processed/a.txt").exists());
        assert!(temp.path().join("processed/b.txt").exists());
        assert!(temp.path().join("notes.md").exists());
        assert!(log.fetch_since(None).unwrap().is_empty());
    }

    #[test]
    fn old_files_archived_unread() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("old.txt"), "1 100 03/01/2020 08:00:00 AM 0\n").unwrap();

        let mut config = settings(temp.path());
        config.ignore_files_before = NaiveDate::from_ymd_opt(2999, 1, 1);
        let mut log = FlatFileLog::new("alog", &config);

        assert!(log.fetch_since(None).unwrap().is_empty());
        assert!(log.pending().is_empty());
        assert!(temp.path().join("old.txt").exists());

        log.commit().unwrap();
        assert!(temp.path().join("processed/old.txt").exists());
    }

    #[test]
    fn missing_directory_is_connection_error() {
        let temp = tempdir().unwrap();
        let mut log = FlatFileLog::new("alog", &settings(&temp.path().join("nope")));
        assert!(matches!(log.fetch_since(None), Err(SyncError::Connection(_))));
    }
}
