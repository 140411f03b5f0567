//! Durable per-source checkpoints.
//!
//! Each source's position lives in `<dir>/<source_id>.checkpoint` as a single
//! `"<time>|<sequence>"` line. Saves use the write-then-rename pattern:
//!
//! 1. Write the new line to `<source_id>.checkpoint.tmp`
//! 2. Fsync the temp file
//! 3. Rename it over the checkpoint
//! 4. Fsync the directory
//!
//! A crash at any point leaves either the old or the new value readable.
//! A missing file means the source has never synced.

use crate::error::{CoreError, CoreResult};
use crate::position::Position;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const CHECKPOINT_EXT: &str = "checkpoint";
const TEMP_SUFFIX: &str = ".tmp";

/// Persists the last committed position of each source.
pub trait CheckpointStore: Send + Sync {
    /// Loads a source's position, or `None` if it has never synced.
    fn load(&self, source_id: &str) -> CoreResult<Option<Position>>;

    /// Replaces a source's position.
    fn save(&self, source_id: &str, position: &Position) -> CoreResult<()>;

    /// Forgets a source's position so the next cycle re-reads full history.
    fn clear(&self, source_id: &str) -> CoreResult<()>;
}

/// Returns an error unless `source_id` is safe to use as a file stem.
pub fn validate_source_id(source_id: &str) -> CoreResult<()> {
    let ok = !source_id.is_empty()
        && source_id.len() <= 128
        && source_id != "."
        && source_id != ".."
        && source_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidSourceId(source_id.to_string()))
    }
}

/// Checkpoint store backed by one small file per source.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the checkpoint file path of a source.
    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{source_id}.{CHECKPOINT_EXT}"))
    }

    fn temp_path_for(&self, source_id: &str) -> PathBuf {
        self.dir
            .join(format!("{source_id}.{CHECKPOINT_EXT}{TEMP_SUFFIX}"))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, source_id: &str) -> CoreResult<Option<Position>> {
        validate_source_id(source_id)?;

        let content = match fs::read_to_string(self.path_for(source_id)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let line = content.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(None);
        }

        line.parse::<Position>()
            .map(Some)
            .map_err(|e| CoreError::CorruptCheckpoint {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })
    }

    fn save(&self, source_id: &str, position: &Position) -> CoreResult<()> {
        validate_source_id(source_id)?;

        let temp_path = self.temp_path_for(source_id);
        let mut file = File::create(&temp_path)?;
        file.write_all(position.to_string().as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path_for(source_id))?;
        self.sync_directory()?;

        tracing::debug!(source = source_id, position = %position, "checkpoint saved");
        Ok(())
    }

    fn clear(&self, source_id: &str) -> CoreResult<()> {
        validate_source_id(source_id)?;

        match fs::remove_file(self.path_for(source_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.sync_directory()
    }
}

/// In-memory checkpoint store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    positions: Mutex<HashMap<String, Position>>,
    saves: Mutex<Vec<(String, Position)>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the positions `other` has for `source_ids`.
    /// Seeded positions do not appear in [`history`](Self::history).
    pub fn seeded_from<'a>(
        other: &dyn CheckpointStore,
        source_ids: impl IntoIterator<Item = &'a str>,
    ) -> CoreResult<Self> {
        let store = Self::new();
        {
            let mut positions = store.positions.lock();
            for id in source_ids {
                if let Some(position) = other.load(id)? {
                    positions.insert(id.to_string(), position);
                }
            }
        }
        Ok(store)
    }

    /// Every save in call order.
    pub fn history(&self) -> Vec<(String, Position)> {
        self.saves.lock().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, source_id: &str) -> CoreResult<Option<Position>> {
        Ok(self.positions.lock().get(source_id).cloned())
    }

    fn save(&self, source_id: &str, position: &Position) -> CoreResult<()> {
        self.positions
            .lock()
            .insert(source_id.to_string(), position.clone());
        self.saves
            .lock()
            .push((source_id.to_string(), position.clone()));
        Ok(())
    }

    fn clear(&self, source_id: &str) -> CoreResult<()> {
        self.positions.lock().remove(source_id);
        Ok(())
    }
}
