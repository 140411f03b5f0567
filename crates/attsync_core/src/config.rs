//! Configuration snapshot.
//!
//! Settings are read from a TOML file into [`Settings`]. The pull side takes
//! a fresh snapshot at the start of every cycle through a [`ConfigProvider`],
//! so edits to the file apply from the next tick without a restart.

use crate::checkpoint::validate_source_id;
use crate::credentials::{
    CredentialProvider, EncryptedCredentialFile, KeySource, SinkCredentials, StaticCredentials,
};
use crate::error::{ConfigError, CoreError, CoreResult};
use crate::profile::DeviceProfile;
use chrono::{NaiveDate, NaiveTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Full runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding checkpoint and lock files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Events per sink write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between two sink writes.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// When pull cycles run.
    #[serde(default)]
    pub schedule: ScheduleSettings,
    /// Pull sources, run in order.
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
    /// Push receiver, if enabled.
    #[serde(default)]
    pub push: Option<PushSettings>,
    /// Cloud sink.
    pub sink: SinkSettings,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_pause_ms() -> u64 {
    100
}

impl Settings {
    /// Parses settings from TOML text. Does not validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and validates settings from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every rule the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        self.schedule.validate()?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            if validate_source_id(&source.id).is_err() {
                return Err(ConfigError::InvalidSourceId(source.id.clone()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
            if let SourceKind::Device(device) = &source.kind {
                device.profile.validate(&source.id)?;
            }
        }

        if let Some(push) = &self.push {
            if push.flush_interval_secs == 0 {
                return Err(ConfigError::InvalidTiming {
                    source_id: "push".into(),
                    reason: "flush interval must be at least one second".into(),
                });
            }
        }

        Ok(())
    }

    /// Sources that are switched on.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceSettings> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Finds a source by id.
    pub fn source(&self, id: &str) -> Option<&SourceSettings> {
        self.sources.iter().find(|s| s.id == id)
    }
}

/// Pull schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleSettings {
    /// Fixed interval.
    Interval {
        /// Seconds between cycle starts.
        every_secs: u64,
    },
    /// Wall-clock times, `HH:MM`.
    Daily {
        /// Times of day.
        times: Vec<String>,
    },
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings::Interval { every_secs: 900 }
    }
}

impl ScheduleSettings {
    /// Parses the daily times.
    pub fn daily_times(times: &[String]) -> Result<Vec<NaiveTime>, ConfigError> {
        times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M")
                    .map_err(|_| ConfigError::InvalidSchedule(format!("bad time {t:?}")))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ScheduleSettings::Interval { every_secs: 0 } => Err(ConfigError::InvalidSchedule(
                "interval must be at least one second".into(),
            )),
            ScheduleSettings::Interval { .. } => Ok(()),
            ScheduleSettings::Daily { times } if times.is_empty() => {
                Err(ConfigError::InvalidSchedule("no daily times listed".into()))
            }
            ScheduleSettings::Daily { times } => Self::daily_times(times).map(|_| ()),
        }
    }
}

/// One pull source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Unique id, also the checkpoint file stem.
    pub id: String,
    /// Disabled sources are skipped.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Source-specific settings.
    #[serde(flatten)]
    pub kind: SourceKind,
}

fn enabled_by_default() -> bool {
    true
}

/// Source-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Local relational store.
    Relational(RelationalSettings),
    /// Directory of exported text logs.
    FlatFile(FlatFileSettings),
    /// Binary-protocol device.
    Device(DeviceSettings),
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalSettings {
    /// Database file.
    pub path: PathBuf,
    /// Attendance table, matched case-insensitively.
    #[serde(default = "default_table")]
    pub table: String,
    /// Serial for rows whose `sn` is empty.
    #[serde(default = "default_access_serial")]
    pub default_serial: String,
}

fn default_table() -> String {
    "checkinout".to_string()
}

fn default_access_serial() -> String {
    "HIP_ACCESS_DB".to_string()
}

/// Exported log directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatFileSettings {
    /// Directory scanned for new files.
    pub dir: PathBuf,
    /// File extension picked up.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Serial assigned to every line.
    #[serde(default = "default_file_serial")]
    pub device_serial: String,
    /// Files created before this date (modified, where creation time is
    /// unavailable) are archived unread.
    #[serde(default)]
    pub ignore_files_before: Option<NaiveDate>,
    /// Where finished files go. Defaults to `<dir>/processed`.
    #[serde(default)]
    pub processed_dir: Option<PathBuf>,
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_file_serial() -> String {
    "HIP_DEVICE_1".to_string()
}

impl FlatFileSettings {
    /// Directory finished files are moved to.
    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir
            .clone()
            .unwrap_or_else(|| self.dir.join("processed"))
    }
}

/// Binary-protocol device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Display name.
    pub name: String,
    /// Host or IP.
    pub host: String,
    /// TCP port.
    #[serde(default = "default_device_port")]
    pub port: u16,
    /// Serial recorded on events. Defaults to `<name>_<host>`.
    #[serde(default)]
    pub serial: Option<String>,
    /// Protocol and decoding profile.
    #[serde(default)]
    pub profile: DeviceProfile,
}

fn default_device_port() -> u16 {
    5005
}

impl DeviceSettings {
    /// Serial recorded on events.
    pub fn serial(&self) -> String {
        self.serial
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.name, self.host))
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Push receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Seconds between background flushes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Optional local journal of accepted records.
    #[serde(default)]
    pub journal: Option<PathBuf>,
    /// Serial used when a request has no `SN`.
    #[serde(default = "default_push_serial")]
    pub default_serial: String,
    /// Values returned to devices in the option handshake.
    #[serde(default)]
    pub options: PushOptions,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_flush_interval() -> u64 {
    60
}

fn default_push_serial() -> String {
    "UNKNOWN".to_string()
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            flush_interval_secs: default_flush_interval(),
            journal: None,
            default_serial: default_push_serial(),
            options: PushOptions::default(),
        }
    }
}

/// Option values sent to pushing devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushOptions {
    /// `ATTLOGStamp`.
    pub attlog_stamp: u64,
    /// `OPERLOGStamp`.
    pub operlog_stamp: u64,
    /// `ATTPHOTOStamp`.
    pub attphoto_stamp: u64,
    /// `ErrorDelay`, seconds.
    pub error_delay: u32,
    /// `Delay`, seconds.
    pub delay: u32,
    /// `TransTimes`.
    pub trans_times: String,
    /// `TransInterval`, minutes.
    pub trans_interval: u32,
    /// `TransFlag`.
    pub trans_flag: String,
    /// `Realtime`.
    pub realtime: u8,
    /// `TimeZone`, hours.
    pub time_zone: i8,
    /// `Encrypt`.
    pub encrypt: u8,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            attlog_stamp: 0,
            operlog_stamp: 0,
            attphoto_stamp: 0,
            error_delay: 60,
            delay: 5,
            trans_times: "00:00;23:59".to_string(),
            trans_interval: 1,
            trans_flag: "TransData AttLog OpLog".to_string(),
            realtime: 1,
            time_zone: 7,
            encrypt: 0,
        }
    }
}

/// Cloud sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Destination table.
    #[serde(default = "default_sink_table")]
    pub table: String,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Create the table on startup if missing.
    #[serde(default = "enabled_by_default")]
    pub ensure_schema: bool,
    /// Where credentials come from.
    pub credentials: CredentialSettings,
}

fn default_sink_table() -> String {
    "device_logs".to_string()
}

fn default_max_connections() -> u32 {
    4
}

/// Credential source.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialSettings {
    /// Encrypted blob on disk.
    EncryptedFile {
        /// Blob path.
        path: PathBuf,
        /// Variable holding the hex key.
        #[serde(default = "default_key_env")]
        key_env: String,
        /// Variable holding a passphrase instead of a hex key.
        #[serde(default)]
        passphrase_env: Option<String>,
        /// HKDF salt for the passphrase.
        #[serde(default = "default_salt")]
        salt: String,
    },
    /// Values written in the file. Meant for development only.
    Inline(SinkCredentials),
}

fn default_key_env() -> String {
    "ATTSYNC_CREDENTIALS_KEY".to_string()
}

fn default_salt() -> String {
    "attsync".to_string()
}

impl std::fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSettings::EncryptedFile { path, .. } => f
                .debug_struct("EncryptedFile")
                .field("path", path)
                .finish_non_exhaustive(),
            CredentialSettings::Inline(creds) => f.debug_tuple("Inline").field(creds).finish(),
        }
    }
}

impl CredentialSettings {
    /// Builds the matching provider.
    pub fn provider(&self) -> Arc<dyn CredentialProvider> {
        match self {
            CredentialSettings::EncryptedFile {
                path,
                key_env,
                passphrase_env,
                salt,
            } => {
                let key = match passphrase_env {
                    Some(var) => KeySource::PassphraseEnv {
                        var: var.clone(),
                        salt: salt.clone(),
                    },
                    None => KeySource::HexEnv(key_env.clone()),
                };
                Arc::new(EncryptedCredentialFile::new(path, key))
            }
            CredentialSettings::Inline(creds) => Arc::new(StaticCredentials::new(creds.clone())),
        }
    }
}

/// Supplies configuration snapshots.
pub trait ConfigProvider: Send + Sync {
    /// Returns the current settings.
    fn snapshot(&self) -> CoreResult<Settings>;

    /// Reads one value by dotted path (`"push.options.time_zone"`), falling
    /// back to `default` when the key is missing or has another type.
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        let Ok(settings) = self.snapshot() else {
            return default;
        };
        let Ok(mut value) = serde_json::to_value(&settings) else {
            return default;
        };
        for part in key.split('.') {
            value = match value {
                serde_json::Value::Object(mut map) => match map.remove(part) {
                    Some(v) => v,
                    None => return default,
                },
                serde_json::Value::Array(mut items) => match part.parse::<usize>() {
                    Ok(i) if i < items.len() => items.swap_remove(i),
                    _ => return default,
                },
                _ => return default,
            };
        }
        serde_json::from_value(value).unwrap_or(default)
    }
}

/// Re-reads a TOML file on every snapshot.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    /// Creates a provider for `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for FileConfigProvider {
    fn snapshot(&self) -> CoreResult<Settings> {
        Settings::load(&self.path).map_err(CoreError::from)
    }
}

/// Always returns the same settings.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider(Settings);

impl StaticConfigProvider {
    /// Wraps fixed settings.
    pub fn new(settings: Settings) -> Self {
        Self(settings)
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn snapshot(&self) -> CoreResult<Settings> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RecordLayout;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
        checkpoint_dir = "state"
        batch_size = 100

        [schedule]
        mode = "daily"
        times = ["09:00", "12:00", "17:00", "22:00"]

        [[sources]]
        id = "access-db"
        kind = "relational"
        path = "Pm2014.sqlite"

        [[sources]]
        id = "alog"
        kind = "flat_file"
        dir = "alog"
        ignore_files_before = "2025-01-14"

        [[sources]]
        id = "f68s"
        kind = "device"
        name = "Main"
        host = "192.168.100.166"
        enabled = false
        profile = { layout = "extended40", clock_offset_secs = 60 }

        [push]
        bind = "127.0.0.1:8080"
        journal = "device_attendance.log"
        [push.options]
        time_zone = 8

        [sink]
        table = "device_logs"
        [sink.credentials]
        source = "inline"
        host = "localhost"
        user = "sync"
        password = "secret"
        database = "attendance"
    "#;

    #[test]
    fn sample_parses_and_validates() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.sources.len(), 3);
        assert_eq!(settings.enabled_sources().count(), 2);

        match &settings.source("access-db").unwrap().kind {
            SourceKind::Relational(r) => {
                assert_eq!(r.table, "checkinout");
                assert_eq!(r.default_serial, "HIP_ACCESS_DB");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &settings.source("alog").unwrap().kind {
            SourceKind::FlatFile(f) => {
                assert_eq!(f.device_serial, "HIP_DEVICE_1");
                assert_eq!(f.processed_dir(), PathBuf::from("alog/processed"));
                assert_eq!(f.ignore_files_before, NaiveDate::from_ymd_opt(2025, 1, 14));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &settings.source("f68s").unwrap().kind {
            SourceKind::Device(d) => {
                assert_eq!(d.port, 5005);
                assert_eq!(d.serial(), "Main_192.168.100.166");
                assert_eq!(d.profile.layout, RecordLayout::Extended40);
                assert_eq!(d.profile.clock_offset_secs, 60);
            }
            other => panic!("unexpected {other:?}"),
        }

        let push = settings.push.as_ref().unwrap();
        assert_eq!(push.options.time_zone, 8);
        assert_eq!(push.options.delay, 5);
        assert_eq!(push.flush_interval_secs, 60);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let text = SAMPLE.replace("id = \"alog\"", "id = \"access-db\"");
        let settings = Settings::from_toml_str(&text).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DuplicateSource(_))
        ));
    }

    #[test]
    fn zero_batch_rejected() {
        let text = SAMPLE.replace("batch_size = 100", "batch_size = 0");
        let settings = Settings::from_toml_str(&text).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidBatchSize)
        ));
    }

    #[test]
    fn bad_schedule_rejected() {
        let text = SAMPLE.replace("\"22:00\"", "\"25:99\"");
        let settings = Settings::from_toml_str(&text).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn unparsable_file_rejected() {
        let err = Settings::from_toml_str("batch_size = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn file_provider_reads_fresh_snapshots() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("attsync.toml");
        fs::write(&path, SAMPLE).unwrap();

        let provider = FileConfigProvider::new(&path);
        assert_eq!(provider.snapshot().unwrap().batch_size, 100);

        fs::write(&path, SAMPLE.replace("batch_size = 100", "batch_size = 25")).unwrap();
        assert_eq!(provider.snapshot().unwrap().batch_size, 25);
        assert_eq!(provider.get("batch_size", 0usize), 25);
    }

    #[test]
    fn get_by_dotted_key() {
        let provider = StaticConfigProvider::new(Settings::from_toml_str(SAMPLE).unwrap());
        assert_eq!(provider.get("push.options.time_zone", 0i64), 8);
        assert_eq!(provider.get("sources.0.id", String::new()), "access-db");
        assert_eq!(provider.get("missing.key", 42u32), 42);
        assert_eq!(provider.get("batch_size", "x".to_string()), "x");
    }

    #[test]
    fn missing_file_is_read_error() {
        let temp = tempdir().unwrap();
        let err = Settings::load(&temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
