//! Pull command implementation.

use super::{load_settings, open_checkpoints, open_sink, runtime, CommandResult};
use attsync_engine::{CycleReport, SyncOrchestrator};
use std::path::Path;

/// Runs one pull cycle and prints a per-source summary.
pub fn run(config: &Path, dry_run: bool) -> CommandResult {
    let settings = load_settings(config)?;
    let runtime = runtime()?;
    let sink = runtime.block_on(open_sink(&settings, dry_run))?;
    let checkpoints = open_checkpoints(&settings, dry_run)?;

    let orchestrator = SyncOrchestrator::new(sink, checkpoints).with_dry_run(dry_run);
    let report = orchestrator.run_snapshot(&settings);
    print_report(&report);

    if report.failures() > 0 {
        return Err(format!("{} source(s) failed", report.failures()).into());
    }
    Ok(())
}

/// Prints one line per source.
pub fn print_report(report: &CycleReport) {
    for (source_id, outcome) in &report.sources {
        match outcome {
            Ok(r) => println!(
                "{source_id}: fetched {} new {} written {} in {} batch(es), checkpoint {}",
                r.fetched,
                r.accepted,
                r.written,
                r.batches,
                r.checkpoint
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Err(e) => println!("{source_id}: FAILED {e}"),
        }
    }
    println!("total written: {}", report.written());
}
