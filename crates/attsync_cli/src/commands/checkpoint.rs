//! Checkpoint command implementation.

use super::{load_settings, CommandResult};
use attsync_core::{CheckpointStore, FileCheckpointStore, Settings};
use std::path::Path;

/// Prints the position of one source, or of every configured source.
pub fn show(config: &Path, source: Option<&str>) -> CommandResult {
    let settings = load_settings(config)?;
    for line in describe(&settings, source)? {
        println!("{line}");
    }
    Ok(())
}

/// Clears a source's position.
pub fn reset(config: &Path, source: &str) -> CommandResult {
    let settings = load_settings(config)?;
    let previous = clear(&settings, source)?;
    match previous {
        Some(position) => println!("{source}: reset (was {position})"),
        None => println!("{source}: had no checkpoint"),
    }
    Ok(())
}

fn known_source<'a>(settings: &Settings, source: &'a str) -> CommandResult<&'a str> {
    if settings.source(source).is_none() {
        return Err(format!("no source named {source:?} in settings").into());
    }
    Ok(source)
}

fn describe(settings: &Settings, source: Option<&str>) -> CommandResult<Vec<String>> {
    let store = FileCheckpointStore::open(&settings.checkpoint_dir)?;
    let ids: Vec<&str> = match source {
        Some(id) => vec![known_source(settings, id)?],
        None => settings.sources.iter().map(|s| s.id.as_str()).collect(),
    };

    let mut lines = Vec::with_capacity(ids.len());
    for id in ids {
        let line = match store.load(id) {
            Ok(Some(position)) => format!("{id}: {position}"),
            Ok(None) => format!("{id}: never synced"),
            Err(e) => format!("{id}: unreadable ({e})"),
        };
        lines.push(line);
    }
    Ok(lines)
}

fn clear(settings: &Settings, source: &str) -> CommandResult<Option<attsync_core::Position>> {
    let id = known_source(settings, source)?;
    let store = FileCheckpointStore::open(&settings.checkpoint_dir)?;
    let previous = store.load(id).ok().flatten();
    store.clear(id)?;
    tracing::info!(source = id, "checkpoint cleared");
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::Position;
    use tempfile::tempdir;

    fn settings(dir: &Path) -> Settings {
        let text = format!(
            r#"
checkpoint_dir = "{}"

[[sources]]
id = "access-db"
kind = "relational"
path = "Pm2014.sqlite"

[[sources]]
id = "alog"
kind = "flat_file"
dir = "alog"

[sink.credentials]
source = "inline"
host = "localhost"
user = "u"
password = "p"
database = "d"
"#,
            dir.display().to_string().replace('\\', "/")
        );
        Settings::from_toml_str(&text).unwrap()
    }

    #[test]
    fn show_lists_every_source() {
        let temp = tempdir().unwrap();
        let settings = settings(temp.path());
        let store = FileCheckpointStore::open(temp.path()).unwrap();
        let position: Position = "2026-01-10 08:00:00|42".parse().unwrap();
        store.save("access-db", &position).unwrap();

        let lines = describe(&settings, None).unwrap();
        assert_eq!(
            lines,
            vec![
                "access-db: 2026-01-10 08:00:00|42".to_string(),
                "alog: never synced".to_string(),
            ]
        );
    }

    #[test]
    fn reset_forgets_position() {
        let temp = tempdir().unwrap();
        let settings = settings(temp.path());
        let store = FileCheckpointStore::open(temp.path()).unwrap();
        let position: Position = "2026-01-10 08:00:00|42".parse().unwrap();
        store.save("access-db", &position).unwrap();

        assert_eq!(clear(&settings, "access-db").unwrap(), Some(position));
        assert_eq!(store.load("access-db").unwrap(), None);
        assert_eq!(clear(&settings, "access-db").unwrap(), None);
    }

    #[test]
    fn unknown_source_is_rejected() {
        let temp = tempdir().unwrap();
        let settings = settings(temp.path());
        assert!(describe(&settings, Some("nope")).is_err());
        assert!(clear(&settings, "nope").is_err());
    }
}
