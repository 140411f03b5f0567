//! Long-running modes: scheduled pulls and the push receiver.

use super::pull::print_report;
use super::{load_settings, open_checkpoints, open_sink, runtime, shutdown_signal, CommandResult};
use attsync_core::{ConfigProvider, FileConfigProvider, Settings};
use attsync_engine::{trigger_from_settings, BatchSink, SyncOrchestrator, TickLoop};
use attsync_server::PushReceiver;
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// Pulls on the schedule and, when `[push]` is configured, serves pushing
/// devices until Ctrl-C.
pub fn run(config: &Path, dry_run: bool) -> CommandResult {
    let settings = load_settings(config)?;
    let runtime = runtime()?;
    let sink = runtime.block_on(open_sink(&settings, dry_run))?;

    let checkpoints = open_checkpoints(&settings, dry_run)?;
    let orchestrator =
        SyncOrchestrator::new(Arc::clone(&sink), checkpoints).with_dry_run(dry_run);
    let mut trigger = trigger_from_settings(&settings.schedule)?;
    let provider = FileConfigProvider::new(config);

    let tick_loop = TickLoop::new();
    let stop = tick_loop.handle();
    let puller = thread::Builder::new()
        .name("attsync-pull".into())
        .spawn(move || tick_loop.run(trigger.as_mut(), || pull_tick(&orchestrator, &provider)))?;

    let served = match &settings.push {
        Some(push) => {
            let receiver = receiver(push.clone(), &settings, sink)?;
            runtime.block_on(receiver.run(shutdown_signal()))
        }
        None => {
            tracing::info!("no [push] section, pulling only");
            runtime.block_on(shutdown_signal());
            Ok(())
        }
    };

    stop.stop();
    match puller.join() {
        Ok(ticks) => tracing::info!(ticks, "pull schedule stopped"),
        Err(_) => tracing::error!("pull thread panicked"),
    }

    served?;
    Ok(())
}

/// Serves pushing devices until Ctrl-C.
pub fn serve(config: &Path, dry_run: bool) -> CommandResult {
    let settings = load_settings(config)?;
    let push = settings
        .push
        .clone()
        .ok_or("settings have no [push] section")?;

    let runtime = runtime()?;
    let sink = runtime.block_on(open_sink(&settings, dry_run))?;
    let receiver = receiver(push, &settings, sink)?;
    runtime.block_on(receiver.run(shutdown_signal()))?;
    Ok(())
}

fn receiver(
    push: attsync_core::PushSettings,
    settings: &Settings,
    sink: Arc<dyn BatchSink>,
) -> CommandResult<PushReceiver> {
    Ok(PushReceiver::new(push, sink)?.with_batch_size(settings.batch_size))
}

/// One scheduled cycle. Settings are re-read so source edits apply without a
/// restart; the sink and schedule stay as started.
fn pull_tick(orchestrator: &SyncOrchestrator, provider: &FileConfigProvider) {
    let settings = match provider.snapshot() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "cannot reload settings, skipping cycle");
            return;
        }
    };

    let report = orchestrator.run_snapshot(&settings);
    print_report(&report);

    let stats = orchestrator.stats();
    tracing::info!(
        cycles = stats.cycles_completed,
        written = stats.events_written,
        failures = stats.source_failures,
        "cycle finished"
    );
}
