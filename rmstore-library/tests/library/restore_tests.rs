/// Track origin and persistence tests
///
/// The URIs handed back to the scanner, reopening a store file and the
/// startup checks on its structure.

use crate::common::store_harness::StoreTestHarness;
use rmstore_core::error::StoreError;
use rmstore_core::test_utils::create_test_track_with_metadata;
use rmstore_core::track::TrackMetadata;
use rmstore_library::{Database, StoreOptions};
use rusqlite::Connection;
use tempfile::TempDir;

fn track(uri: &str, title: &str, mtime: i64) -> TrackMetadata {
    let mut track = create_test_track_with_metadata(uri, title, Some("X"), Some("M"), Some(1));
    track.file_modified_time = mtime;
    track
}

#[test]
fn test_restored_tracks_report_modification_times() {
    let mut harness = StoreTestHarness::new().unwrap();
    harness
        .insert(&[
            track("file:///music/m/1.flac", "A", 100),
            track("file:///music/n/1.flac", "B", 200),
        ])
        .unwrap();

    let restored = harness.database.ask_restored_tracks().unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored["file:///music/m/1.flac"], 100);
    assert_eq!(restored["file:///music/n/1.flac"], 200);
}

#[test]
fn test_rescan_updates_origin_time() {
    let mut harness = StoreTestHarness::new().unwrap();
    harness.insert(&[track("file:///music/m/1.flac", "A", 100)]).unwrap();
    harness.insert(&[track("file:///music/m/1.flac", "A", 150)]).unwrap();

    let restored = harness.database.ask_restored_tracks().unwrap();
    assert_eq!(restored["file:///music/m/1.flac"], 150);
    assert_eq!(
        harness.track_at("file:///music/m/1.flac").unwrap().file_modified_time,
        150
    );
}

#[test]
fn test_origin_survives_track_removal() {
    let mut harness = StoreTestHarness::new().unwrap();
    harness.insert(&[track("file:///music/m/1.flac", "A", 100)]).unwrap();

    harness.remove(&["file:///music/m/1.flac"]).unwrap();

    assert!(harness.track_at("file:///music/m/1.flac").is_none());
    let restored = harness.database.ask_restored_tracks().unwrap();
    assert_eq!(restored.get("file:///music/m/1.flac"), Some(&100));
}

#[test]
fn test_store_persists_across_reopen() {
    let mut harness = StoreTestHarness::new().unwrap();
    harness.insert(&[track("file:///music/m/1.flac", "A", 100)]).unwrap();
    harness.play("file:///music/m/1.flac", 5_000).unwrap();

    harness.reopen().unwrap();

    assert_eq!(harness.database.schema_version().unwrap(), 4);
    let stored = harness.track_at("file:///music/m/1.flac").unwrap();
    assert_eq!(stored.title, "A");
    assert_eq!(stored.play_count, 1);
    assert_eq!(harness.database.ask_restored_tracks().unwrap().len(), 1);
}

#[test]
fn test_clear_data_empties_store() {
    let mut harness = StoreTestHarness::new().unwrap();
    harness.insert(&[track("file:///music/m/1.flac", "A", 100)]).unwrap();

    harness.database.clear_data().unwrap();

    assert_eq!(harness.database.count_tracks().unwrap(), 0);
    assert_eq!(harness.database.count_albums().unwrap(), 0);
    assert_eq!(harness.database.count_artists().unwrap(), 0);
    assert!(harness.database.ask_restored_tracks().unwrap().is_empty());

    // Still usable afterwards
    harness.insert(&[track("file:///music/m/2.flac", "B", 100)]).unwrap();
    assert_eq!(harness.database.count_tracks().unwrap(), 1);
}

#[test]
fn test_newer_store_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("library.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tracks (id INTEGER PRIMARY KEY);
             PRAGMA user_version = 99;",
        )
        .unwrap();
    }

    let err = Database::open(&path, StoreOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::Schema(_)));
    assert!(err.is_fatal());
}

fn write_damaged_store(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tracks (id INTEGER PRIMARY KEY, bogus TEXT);
         INSERT INTO tracks (id, bogus) VALUES (1, 'x');
         PRAGMA user_version = 4;",
    )
    .unwrap();
}

#[test]
fn test_damaged_store_refused_without_reset() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("library.db");
    write_damaged_store(&path);

    let err = Database::open(
        &path,
        StoreOptions {
            reset_on_schema_mismatch: false,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Schema(_)));
}

#[test]
fn test_damaged_store_reset_when_allowed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("library.db");
    write_damaged_store(&path);

    let db = Database::open(&path, StoreOptions::default()).unwrap();

    assert_eq!(db.count_tracks().unwrap(), 0);
    assert_eq!(db.schema_version().unwrap(), 4);
}
