//! Probe command implementation.

use super::CommandResult;
use attsync_core::{DeviceProfile, Settings, SourceKind};
use attsync_device::{DeviceClient, PullOutcome};
use serde::Serialize;
use std::path::Path;

/// Probe result.
#[derive(Debug, Serialize)]
pub struct ProbeResult {
    /// Device address.
    pub addr: String,
    /// Token used for the data request.
    pub token: u8,
    /// Bytes received in the data phase.
    pub bytes_received: usize,
    /// Decoded records.
    pub records: usize,
    /// Records rejected as noise.
    pub noise: usize,
    /// Session wall time in milliseconds.
    pub elapsed_ms: u128,
    /// First decoded records.
    pub sample: Vec<ProbeRecord>,
}

/// One decoded record.
#[derive(Debug, Serialize)]
pub struct ProbeRecord {
    /// Position in the reply.
    pub index: u64,
    /// Subject id.
    pub subject_id: u32,
    /// Corrected event time, if representable.
    pub time: Option<String>,
    /// Raw verify mode.
    pub verify_mode: u8,
}

/// Runs one device session against `host:port` and prints the outcome.
///
/// The profile of a configured device source with the same host is used
/// when the settings file can be read; otherwise the defaults apply.
pub fn run(config: &Path, host: &str, port: u16, show: usize, format: &str) -> CommandResult {
    let profile = configured_profile(config, host);
    let client = DeviceClient::new(format!("{host}:{port}"), profile.clone());
    let outcome = client.pull()?;
    let result = summarize(client.addr(), &outcome, &profile, show);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }
    Ok(())
}

fn configured_profile(config: &Path, host: &str) -> DeviceProfile {
    let Ok(settings) = Settings::load(config) else {
        return DeviceProfile::default();
    };
    settings
        .sources
        .iter()
        .find_map(|source| match &source.kind {
            SourceKind::Device(device) if device.host == host => Some(device.profile.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn summarize(addr: &str, outcome: &PullOutcome, profile: &DeviceProfile, show: usize) -> ProbeResult {
    let sample = outcome
        .reply
        .records
        .iter()
        .take(show)
        .map(|record| ProbeRecord {
            index: record.index,
            subject_id: record.subject_id,
            time: profile
                .corrected_time(record.timestamp)
                .map(|t| t.format(attsync_core::TIME_FORMAT).to_string()),
            verify_mode: record.verify_mode,
        })
        .collect();

    ProbeResult {
        addr: addr.to_string(),
        token: outcome.token,
        bytes_received: outcome.bytes_received,
        records: outcome.reply.records.len(),
        noise: outcome.reply.noise,
        elapsed_ms: outcome.elapsed.as_millis(),
        sample,
    }
}

fn print_text(result: &ProbeResult) {
    println!("Device: {}", result.addr);
    println!("Token: 0x{:02x}", result.token);
    println!("Bytes received: {}", result.bytes_received);
    println!("Records: {} ({} rejected as noise)", result.records, result.noise);
    println!("Elapsed: {} ms", result.elapsed_ms);
    if !result.sample.is_empty() {
        println!();
        println!("{:>8}  {:>10}  {:<19}  verify", "index", "subject", "time");
        for record in &result.sample {
            println!(
                "{:>8}  {:>10}  {:<19}  {}",
                record.index,
                record.subject_id,
                record.time.as_deref().unwrap_or("-"),
                record.verify_mode
            );
        }
    }
}
