//! Advisory per-source lock files.

use crate::checkpoint::validate_source_id;
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive lock on one source, held until dropped.
///
/// Two processes sharing a checkpoint directory never run a cycle for the
/// same source at the same time: the second one gets
/// [`CoreError::SourceLocked`] and skips the source.
#[derive(Debug)]
pub struct SourceLock {
    path: PathBuf,
    _file: File,
}

impl SourceLock {
    /// Tries to take the lock for `source_id` inside `dir` without blocking.
    pub fn try_acquire(dir: &Path, source_id: &str) -> CoreResult<Self> {
        validate_source_id(source_id)?;
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("{source_id}.lock"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::SourceLocked(source_id.to_string()));
        }

        Ok(Self { path, _file: file })
    }

    /// Returns the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_lock_is_refused() {
        let temp = tempdir().unwrap();
        let _held = SourceLock::try_acquire(temp.path(), "dev").unwrap();

        let result = SourceLock::try_acquire(temp.path(), "dev");
        assert!(matches!(result, Err(CoreError::SourceLocked(_))));

        assert!(SourceLock::try_acquire(temp.path(), "other").is_ok());
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let lock = SourceLock::try_acquire(temp.path(), "dev").unwrap();
            assert!(lock.path().exists());
        }
        assert!(SourceLock::try_acquire(temp.path(), "dev").is_ok());
    }
}
