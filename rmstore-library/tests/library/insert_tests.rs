/// Insert path tests
///
/// New tracks, idempotent rescans, re-tagged files, duplicate content and
/// album resolution.

use crate::common::store_harness::{
    StoreTestHarness, added_tracks, modified_albums, modified_tracks, removed_ids,
};
use rmstore_core::event::LibraryEvent;
use rmstore_core::test_utils::{create_test_track, create_test_track_with_metadata};
use rmstore_core::track::TrackMetadata;
use std::collections::HashMap;

fn track(uri: &str, title: &str, artist: &str, album: &str, number: u32) -> TrackMetadata {
    create_test_track_with_metadata(uri, title, Some(artist), Some(album), Some(number))
}

#[test]
fn test_inserted_track_round_trips() {
    let mut harness = StoreTestHarness::new().unwrap();

    let events = harness
        .insert(&[track("file:///music/m/1.flac", "A", "X", "M", 1)])
        .unwrap();

    assert!(matches!(events[0], LibraryEvent::ArtistsAdded(ref a) if a[0].name == "X"));
    assert!(matches!(events[1], LibraryEvent::AlbumsAdded(ref a) if a[0].title == "M"));
    let added = added_tracks(&events);
    assert_eq!(added.len(), 1);

    let stored = harness
        .database
        .track_data_from_database_id(added[0].database_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "A");
    assert_eq!(stored.artist.as_deref(), Some("X"));
    assert_eq!(stored.album, "M");
    assert_eq!(stored.track_number, Some(1));
    assert_eq!(stored.disc_number, Some(1));

    let album_tracks = harness.database.album_data(stored.album_id).unwrap();
    assert_eq!(
        album_tracks
            .iter()
            .filter(|t| t.database_id == stored.database_id)
            .count(),
        1
    );
}

#[test]
fn test_reinsert_is_idempotent() {
    let mut harness = StoreTestHarness::new().unwrap();
    let t = track("file:///music/m/1.flac", "A", "X", "M", 1);

    harness.insert(&[t.clone()]).unwrap();
    let events = harness.insert(&[t]).unwrap();

    assert!(events.is_empty(), "unexpected events: {events:?}");
    assert_eq!(harness.database.count_tracks().unwrap(), 1);
    assert_eq!(harness.database.count_albums().unwrap(), 1);
}

#[test]
fn test_retagged_file_is_modified_in_place() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[create_test_track("file:///a.mp3", "Old")])
        .unwrap();
    let events = harness
        .insert(&[create_test_track("file:///a.mp3", "New")])
        .unwrap();

    assert!(added_tracks(&events).is_empty());
    let modified = modified_tracks(&events);
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].title, "New");

    let all = harness.database.all_tracks_data().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "New");
}

#[test]
fn test_two_track_album() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[
            track("file:///music/m/2.flac", "B", "X", "M", 2),
            track("file:///music/m/1.flac", "A", "X", "M", 1),
        ])
        .unwrap();

    let albums = harness.database.all_albums_data().unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].title, "M");
    assert_eq!(albums[0].artist.as_deref(), Some("X"));
    assert_eq!(albums[0].tracks_count, 2);

    let tracks = harness.database.album_data(albums[0].database_id).unwrap();
    let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "B"]);
}

#[test]
fn test_names_keep_first_casing() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[track("file:///music/m/1.flac", "A", "Xavier", "M", 1)])
        .unwrap();
    let events = harness
        .insert(&[track("file:///music/m/2.flac", "B", "XAVIER", "m", 2)])
        .unwrap();

    assert!(!events.iter().any(|e| matches!(e, LibraryEvent::ArtistsAdded(_))));
    let artists = harness.database.all_artists_data().unwrap();
    assert_eq!(artists.len(), 1);
    assert_eq!(artists[0].name, "Xavier");
    assert_eq!(harness.database.count_albums().unwrap(), 1);
}

#[test]
fn test_duplicate_content_in_later_batch_keeps_both_files() {
    let mut harness = StoreTestHarness::new().unwrap();
    let mut first = create_test_track("file:///a/intro.flac", "Intro");
    first.artist = Some("X".to_owned());
    let mut second = create_test_track("file:///b/intro.flac", "Intro");
    second.artist = Some("X".to_owned());

    let events = harness.insert(&[first]).unwrap();
    let first_id = added_tracks(&events)[0].database_id;
    harness.play("file:///a/intro.flac", 1_000).unwrap();

    let events = harness.insert(&[second]).unwrap();

    assert!(modified_tracks(&events).is_empty());
    assert_eq!(added_tracks(&events).len(), 1);
    assert_eq!(harness.database.count_tracks().unwrap(), 2);

    // The earlier file keeps its row and its history
    let kept = harness.track_at("file:///a/intro.flac").unwrap();
    assert_eq!(kept.database_id, first_id);
    assert_eq!(kept.play_count, 1);
    assert!(harness.track_at("file:///b/intro.flac").is_some());

    let restored = harness.database.ask_restored_tracks().unwrap();
    assert!(restored.contains_key("file:///a/intro.flac"));
    assert!(restored.contains_key("file:///b/intro.flac"));

    // Natural-key lookups answer the first registered copy
    assert_eq!(
        harness
            .database
            .track_id_from_title_album_track_disc_number("Intro", Some("X"), None, None, None)
            .unwrap(),
        Some(first_id)
    );
}

#[test]
fn test_duplicates_within_one_batch_are_ranked() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[
            track("file:///a/m/1.flac", "A", "X", "M", 1),
            track("file:///b/m/1.flac", "A", "X", "M", 1),
        ])
        .unwrap();

    assert_eq!(harness.database.count_tracks().unwrap(), 2);

    let first = harness
        .database
        .track_id_from_file_name("file:///a/m/1.flac")
        .unwrap();
    let resolved = harness
        .database
        .track_id_from_title_album_track_disc_number("A", Some("X"), Some("M"), Some(1), Some(1))
        .unwrap();
    assert_eq!(resolved, first);
}

#[test]
fn test_compilation_becomes_various_artists() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[track("file:///music/hits/1.flac", "One", "X", "Hits", 1)])
        .unwrap();
    let events = harness
        .insert(&[track("file:///music/hits/2.flac", "Two", "Y", "Hits", 2)])
        .unwrap();

    let albums = modified_albums(&events);
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].artist.as_deref(), Some("Various Artists"));
    assert_eq!(albums[0].tracks_count, 2);

    let all = harness.database.all_albums_data().unwrap();
    assert_eq!(all.len(), 1);

    let names: Vec<_> = harness
        .database
        .all_artists_data()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["Various Artists", "X", "Y"]);
}

#[test]
fn test_same_title_in_other_directory_is_another_album() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[
            track("file:///music/x/1.flac", "One", "X", "Greatest Hits", 1),
            track("file:///music/y/1.flac", "Uno", "Y", "Greatest Hits", 1),
        ])
        .unwrap();

    let albums = harness.database.all_albums_data().unwrap();
    assert_eq!(albums.len(), 2);
    assert!(albums.iter().all(|a| a.tracks_count == 1));
}

#[test]
fn test_album_artist_tag_groups_tracks() {
    let mut harness = StoreTestHarness::new().unwrap();

    let mut first = track("file:///music/live/1.flac", "One", "X", "Live", 1);
    first.album_artist = Some("Band".to_owned());
    let mut second = track("file:///music/live/2.flac", "Two", "Y", "Live", 2);
    second.album_artist = Some("Band".to_owned());

    harness.insert(&[first, second]).unwrap();

    let albums = harness.database.all_albums_data().unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].artist.as_deref(), Some("Band"));
    assert_eq!(albums[0].album_artist.as_deref(), Some("Band"));
    assert_eq!(albums[0].tracks_count, 2);

    let stored = harness.track_at("file:///music/live/2.flac").unwrap();
    assert_eq!(stored.artist.as_deref(), Some("Y"));
    assert_eq!(stored.album_artist.as_deref(), Some("Band"));
}

#[test]
fn test_cover_update_modifies_album() {
    let mut harness = StoreTestHarness::new().unwrap();
    let t = track("file:///music/m/1.flac", "A", "X", "M", 1);

    let covers = HashMap::from([("M".to_owned(), "file:///covers/m.jpg".to_owned())]);
    harness.insert_with_covers(&[t.clone()], &covers).unwrap();
    assert_eq!(
        harness.album_titled("M").unwrap().cover_uri.as_deref(),
        Some("file:///covers/m.jpg")
    );

    let covers = HashMap::from([("M".to_owned(), "file:///covers/m2.jpg".to_owned())]);
    let events = harness.insert_with_covers(&[t], &covers).unwrap();

    assert_eq!(events.len(), 1);
    let albums = modified_albums(&events);
    assert_eq!(albums[0].cover_uri.as_deref(), Some("file:///covers/m2.jpg"));
    assert_eq!(
        harness.track_at("file:///music/m/1.flac").unwrap().album_cover.as_deref(),
        Some("file:///covers/m2.jpg")
    );
}

#[test]
fn test_multi_disc_album() {
    let mut harness = StoreTestHarness::new().unwrap();

    let mut second_disc = track("file:///music/m/2-1.flac", "C", "X", "M", 1);
    second_disc.disc_number = Some(2);

    harness
        .insert(&[track("file:///music/m/1-1.flac", "A", "X", "M", 1), second_disc])
        .unwrap();

    let album = harness.album_titled("M").unwrap();
    assert!(!album.is_single_disc);

    let tracks = harness.database.album_data(album.database_id).unwrap();
    assert_eq!(tracks[0].title, "A");
    assert_eq!(tracks[1].title, "C");
    assert!(!tracks[0].is_single_disc_album);
}

#[test]
fn test_track_without_album_joins_artist_album() {
    let mut harness = StoreTestHarness::new().unwrap();

    let mut loose_x = create_test_track("file:///music/loose/x.mp3", "Single");
    loose_x.artist = Some("X".to_owned());
    let mut loose_y = create_test_track("file:///music/loose/y.mp3", "Other");
    loose_y.artist = Some("Y".to_owned());

    harness.insert(&[loose_x, loose_y]).unwrap();

    let albums = harness.database.all_albums_data().unwrap();
    assert_eq!(albums.len(), 2);
    assert!(albums.iter().all(|a| a.title.is_empty()));
    assert_eq!(harness.database.all_albums_data_by_artist("X").unwrap().len(), 1);
}

#[test]
fn test_composer_lyricist_and_genre_rows() {
    let mut harness = StoreTestHarness::new().unwrap();

    let mut t = track("file:///music/m/1.flac", "A", "X", "M", 1);
    t.composer = Some("Composer".to_owned());
    t.lyricist = Some("Writer".to_owned());
    t.genre = Some("Rock".to_owned());

    let events = harness.insert(&[t]).unwrap();

    assert!(events.iter().any(|e| matches!(e, LibraryEvent::ComposersAdded(c) if c[0].name == "Composer")));
    assert!(events.iter().any(|e| matches!(e, LibraryEvent::LyricistsAdded(l) if l[0].name == "Writer")));
    assert!(events.iter().any(|e| matches!(e, LibraryEvent::GenresAdded(g) if g[0].name == "Rock")));

    let stored = harness.track_at("file:///music/m/1.flac").unwrap();
    assert_eq!(stored.composer.as_deref(), Some("Composer"));
    assert_eq!(stored.lyricist.as_deref(), Some("Writer"));
    assert_eq!(stored.genre.as_deref(), Some("Rock"));
    assert_eq!(harness.album_titled("M").unwrap().genres, vec!["Rock".to_owned()]);
}

#[test]
fn test_track_without_uri_is_skipped() {
    let mut harness = StoreTestHarness::new().unwrap();

    let events = harness
        .insert(&[TrackMetadata {
            title: Some("Nowhere".to_owned()),
            ..Default::default()
        }])
        .unwrap();

    assert!(events.is_empty());
    assert_eq!(harness.database.count_tracks().unwrap(), 0);
}

#[test]
fn test_changed_artist_moves_track_and_sweeps_old_rows() {
    let mut harness = StoreTestHarness::new().unwrap();

    harness
        .insert(&[track("file:///music/m/1.flac", "A", "X", "M", 1)])
        .unwrap();
    let old_album = harness.album_titled("M").unwrap().database_id;

    let events = harness
        .insert(&[track("file:///music/m/1.flac", "A", "Z", "M", 1)])
        .unwrap();

    assert!(events.iter().any(|e| matches!(e, LibraryEvent::AlbumsAdded(_))));
    assert_eq!(modified_tracks(&events).len(), 1);
    let (tracks, albums, artists) = removed_ids(&events);
    assert!(tracks.is_empty());
    assert_eq!(albums, vec![old_album]);
    assert_eq!(artists.len(), 1);

    let names: Vec<_> = harness
        .database
        .all_artists_data()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["Z"]);
}

#[test]
fn test_genre_retag_modifies_album() {
    let mut harness = StoreTestHarness::new().unwrap();
    let mut rock = track("file:///music/m/1.flac", "A", "X", "M", 1);
    rock.genre = Some("Rock".to_owned());
    let mut jazz = rock.clone();
    jazz.genre = Some("Jazz".to_owned());

    harness.insert(&[rock]).unwrap();
    let events = harness.insert(&[jazz]).unwrap();

    let albums = modified_albums(&events);
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].genres, vec!["Jazz".to_owned()]);
    assert_eq!(modified_tracks(&events).len(), 1);
}

#[test]
fn test_genre_retag_with_unchanged_album_genres() {
    let mut harness = StoreTestHarness::new().unwrap();
    let mut first = track("file:///music/m/1.flac", "A", "X", "M", 1);
    first.genre = Some("Rock".to_owned());
    let mut second = track("file:///music/m/2.flac", "B", "X", "M", 2);
    second.genre = Some("Jazz".to_owned());
    let mut third = track("file:///music/m/3.flac", "C", "X", "M", 3);
    third.genre = Some("Rock".to_owned());
    harness.insert(&[first.clone(), second, third]).unwrap();

    // Rock and Jazz both remain on the album
    first.genre = Some("Jazz".to_owned());
    let events = harness.insert(&[first]).unwrap();

    assert_eq!(modified_tracks(&events).len(), 1);
    assert!(modified_albums(&events).is_empty());
    assert_eq!(
        harness.album_titled("M").unwrap().genres,
        vec!["Jazz".to_owned(), "Rock".to_owned()]
    );
}

#[test]
fn test_album_artist_tag_added_later_marks_album_tagged() {
    let mut harness = StoreTestHarness::new().unwrap();
    harness
        .insert(&[track("file:///music/m/1.flac", "A", "X", "M", 1)])
        .unwrap();
    assert_eq!(harness.album_titled("M").unwrap().album_artist, None);

    let mut tagged = track("file:///music/m/2.flac", "B", "Y", "M", 2);
    tagged.album_artist = Some("X".to_owned());
    let events = harness.insert(&[tagged]).unwrap();

    let albums = modified_albums(&events);
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].album_artist.as_deref(), Some("X"));
    assert_eq!(harness.database.count_albums().unwrap(), 1);
}
