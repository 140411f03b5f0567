//! Checkpoint durability scenarios.

use attsync_core::{CheckpointStore, FileCheckpointStore, Position, SourceLock};
use std::fs;
use tempfile::tempdir;

fn pos(s: &str) -> Position {
    s.parse().unwrap()
}

#[test]
fn survives_reopen() {
    let temp = tempdir().unwrap();

    {
        let store = FileCheckpointStore::open(temp.path()).unwrap();
        store.save("access-db", &pos("2026-01-10 09:01:00|58")).unwrap();
    }

    let store = FileCheckpointStore::open(temp.path()).unwrap();
    assert_eq!(
        store.load("access-db").unwrap(),
        Some(pos("2026-01-10 09:01:00|58"))
    );
}

#[test]
fn crash_before_rename_keeps_prior_value() {
    let temp = tempdir().unwrap();
    let store = FileCheckpointStore::open(temp.path()).unwrap();
    store.save("dev", &pos("2026-01-10 09:00:00|55")).unwrap();

    // A writer died after creating the temp file but before the rename.
    fs::write(
        temp.path().join("dev.checkpoint.tmp"),
        "2026-01-10 09:05:00|9",
    )
    .unwrap();

    let reopened = FileCheckpointStore::open(temp.path()).unwrap();
    assert_eq!(
        reopened.load("dev").unwrap(),
        Some(pos("2026-01-10 09:00:00|55"))
    );
}

#[test]
fn sources_are_independent() {
    let temp = tempdir().unwrap();
    let store = FileCheckpointStore::open(temp.path()).unwrap();

    store.save("a", &pos("2026-01-10 09:00:00|1")).unwrap();
    store.save("b", &pos("2026-02-01 00:00:00|x")).unwrap();
    store.clear("a").unwrap();

    assert_eq!(store.load("a").unwrap(), None);
    assert_eq!(store.load("b").unwrap(), Some(pos("2026-02-01 00:00:00|x")));
}

#[test]
fn lock_lives_next_to_checkpoints() {
    let temp = tempdir().unwrap();
    let store = FileCheckpointStore::open(temp.path()).unwrap();
    let lock = SourceLock::try_acquire(store.dir(), "dev").unwrap();

    store.save("dev", &pos("2026-01-10 09:00:00|1")).unwrap();
    assert_eq!(lock.path().parent(), Some(temp.path()));
}
