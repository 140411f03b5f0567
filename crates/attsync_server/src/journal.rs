//! Local journal of accepted push records.

use crate::error::{ServerError, ServerResult};
use attsync_core::{PushLine, TIME_FORMAT};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct JournalRecord<'a> {
    device_sn: &'a str,
    user_id: &'a str,
    check_time: String,
    check_type: &'a str,
    verify_type: &'a str,
    work_code: &'a str,
    raw_data: &'a str,
    received_at: String,
}

/// Append-only file with one `<received_at>|<json>` line per record.
///
/// The journal is a local backup and independent of the sink; a failed
/// append is logged and never rejects the request.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Opens or creates the journal.
    pub fn open(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ServerError::Journal {
                path: path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ServerError::Journal {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends records received at `received_at`.
    pub fn append(&self, received_at: NaiveDateTime, lines: &[PushLine]) -> ServerResult<()> {
        let received = received_at.format(TIME_FORMAT).to_string();
        let mut out = String::new();
        for line in lines {
            let record = JournalRecord {
                device_sn: &line.serial,
                user_id: &line.subject_id,
                check_time: line.time.format(TIME_FORMAT).to_string(),
                check_type: &line.check_type,
                verify_type: &line.verify_type,
                work_code: &line.work_code,
                raw_data: &line.raw,
                received_at: received.clone(),
            };
            let json = serde_json::to_string(&record)
                .map_err(|e| ServerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            out.push_str(&received);
            out.push('|');
            out.push_str(&json);
            out.push('\n');
        }

        let mut file = self.file.lock();
        file.write_all(out.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
