//! Relational store polling.

use super::{CheckpointMode, SourceConnector};
use crate::error::{SyncError, SyncResult};
use attsync_core::{
    parse_time, Position, RawEvent, RecordNormalizer, RelationalSettings, SequenceId, SourceRow,
    TIME_FORMAT,
};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;

/// Polls an attendance table for rows after the checkpoint.
///
/// The store is opened read-only for each fetch and closed afterwards, so a
/// store that is briefly unavailable only costs one cycle. Rows are selected
/// by `checktime >= last_time` in SQL, against a text bound for text times
/// and an epoch-seconds bound for integer times. The tie-break on `sn` and
/// the final ordering happen here so that numeric serials compare numerically
/// whatever the column's storage class.
#[derive(Debug)]
pub struct RelationalPoll {
    id: String,
    path: PathBuf,
    table: String,
    normalizer: RecordNormalizer,
}

impl RelationalPoll {
    /// Creates a connector from settings.
    pub fn new(id: &str, settings: &RelationalSettings) -> Self {
        Self {
            id: id.to_string(),
            path: settings.path.clone(),
            table: settings.table.clone(),
            normalizer: RecordNormalizer::new(&settings.default_serial),
        }
    }

    fn open(&self) -> SyncResult<Connection> {
        if !self.path.exists() {
            return Err(SyncError::Connection(format!(
                "store {} not found",
                self.path.display()
            )));
        }
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SyncError::Connection(format!("{}: {e}", self.path.display())))
    }

    /// Finds the configured table, ignoring case.
    fn resolve_table(&self, conn: &Connection) -> SyncResult<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        for name in names {
            let name = name.map_err(|e| SyncError::Connection(e.to_string()))?;
            if name.eq_ignore_ascii_case(&self.table) {
                return Ok(name);
            }
        }

        Err(SyncError::source(
            &self.id,
            format!("table {:?} not found", self.table),
        ))
    }

    fn read_rows(&self, conn: &Connection, since: Option<&Position>) -> SyncResult<Vec<SourceRow>> {
        let table = self.resolve_table(conn)?;
        let mut sql = format!(
            "SELECT Badgenumber, checktime, checktype, verifycode, sensorid, workcode, sn \
             FROM \"{}\"",
            table.replace('"', "\"\"")
        );
        if since.is_some() {
            // SQLite sorts every INTEGER below every TEXT value.
            sql.push_str(
                " WHERE checktime >= ?1 OR (typeof(checktime) = 'integer' AND checktime >= ?2)",
            );
        }
        sql.push_str(" ORDER BY checktime");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| SyncError::source(&self.id, e.to_string()))?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<[Value; 7]> {
            Ok([
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ])
        };

        let raw_rows: Vec<[Value; 7]> = match since {
            Some(pos) => {
                let text_bound = pos.event_time.format(TIME_FORMAT).to_string();
                let epoch_bound = pos.event_time.and_utc().timestamp();
                stmt.query_map(rusqlite::params![text_bound, epoch_bound], map_row)
                    .and_then(|rows| rows.collect())
            }
            None => stmt.query_map([], map_row).and_then(|rows| rows.collect()),
        }
        .map_err(|e| SyncError::Connection(e.to_string()))?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for [badge, time, check_type, verify, sensor, work, sn] in raw_rows {
            let Some(check_time) = value_to_time(&time) else {
                tracing::warn!(source = %self.id, value = ?time, "skipping row with unreadable checktime");
                continue;
            };
            rows.push(SourceRow {
                badge: value_to_string(&badge).unwrap_or_default(),
                check_time,
                check_type: value_to_string(&check_type),
                verify_code: value_to_string(&verify),
                sensor_id: value_to_string(&sensor),
                work_code: value_to_string(&work),
                sn: value_to_string(&sn),
            });
        }
        Ok(rows)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(hex::encode(b)),
    }
}

fn value_to_time(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Text(s) => parse_time(s.trim()),
        Value::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
        _ => None,
    }
}

impl SourceConnector for RelationalPoll {
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
        let conn = self.open()?;
        let mut rows = self.read_rows(&conn, since)?;
        drop(conn);

        if let Some(pos) = since {
            rows.retain(|row| {
                let seq = SequenceId::new(row.sn.clone().unwrap_or_default());
                pos.is_before(&row.check_time, &seq)
            });
        }
        rows.sort_by_cached_key(|row| {
            (
                row.check_time,
                SequenceId::new(row.sn.clone().unwrap_or_default()),
            )
        });

        tracing::debug!(source = %self.id, rows = rows.len(), "polled relational store");
        Ok(rows.into_iter().map(RawEvent::Row).collect())
    }
}
