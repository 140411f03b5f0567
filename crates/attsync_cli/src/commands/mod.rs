//! CLI command implementations.

pub mod checkpoint;
pub mod daemon;
pub mod probe;
pub mod pull;

use attsync_core::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, Settings};
use attsync_engine::{BatchSink, MemorySink, MySqlSink};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

/// Result type of every command.
pub type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// Loads and validates the settings file.
pub fn load_settings(path: &Path) -> CommandResult<Settings> {
    let settings = Settings::load(path)?;
    tracing::debug!(
        path = %path.display(),
        sources = settings.sources.len(),
        push = settings.push.is_some(),
        "settings loaded"
    );
    Ok(settings)
}

/// Connects the sink, or an in-memory one on a dry run. Must run inside a
/// tokio runtime.
pub async fn open_sink(settings: &Settings, dry_run: bool) -> CommandResult<Arc<dyn BatchSink>> {
    if dry_run {
        tracing::warn!("dry run, events are not written to the sink");
        return Ok(Arc::new(MemorySink::new()));
    }

    let credentials = settings.sink.credentials.provider();
    let sink = MySqlSink::connect(credentials.as_ref(), &settings.sink).await?;
    if settings.sink.ensure_schema {
        sink.ensure_schema().await?;
    }
    Ok(Arc::new(sink))
}

/// Opens the checkpoint store. A dry run works on an in-memory copy seeded
/// from the files, so positions on disk never move.
pub fn open_checkpoints(
    settings: &Settings,
    dry_run: bool,
) -> CommandResult<Arc<dyn CheckpointStore>> {
    let files = FileCheckpointStore::open(&settings.checkpoint_dir)?;
    if !dry_run {
        return Ok(Arc::new(files));
    }
    let ids = settings.sources.iter().map(|s| s.id.as_str());
    Ok(Arc::new(MemoryCheckpointStore::seeded_from(&files, ids)?))
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Builds the runtime that owns the sink pool and the receiver.
pub fn runtime() -> CommandResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("attsync-rt")
        .build()?)
}
