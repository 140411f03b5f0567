//! Configuration for the sync engine.

use attsync_core::Settings;
use std::path::PathBuf;
use std::time::Duration;

/// Per-cycle settings of the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Events per sink write.
    pub batch_size: usize,
    /// Pause between two sink writes.
    pub batch_pause: Duration,
    /// Directory for per-source lock files. No locking when unset.
    pub lock_dir: Option<PathBuf>,
}

impl SyncConfig {
    /// Creates a configuration with the default batch size of 100.
    pub fn new() -> Self {
        Self {
            batch_size: 100,
            batch_pause: Duration::from_millis(100),
            lock_dir: None,
        }
    }

    /// Derives the configuration from a settings snapshot.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            batch_pause: Duration::from_millis(settings.batch_pause_ms),
            lock_dir: Some(settings.checkpoint_dir.clone()),
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the pause between batches.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Enables per-source lock files in `dir`.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
