//! Shared test utilities for the rmstore workspace
//!
//! Only available when the "test-utils" feature is enabled.

use crate::track::TrackMetadata;
use std::time::Duration;

/// Create a test track with minimal required fields
///
/// # Examples
///
/// ```
/// # use rmstore_core::test_utils::create_test_track;
/// let track = create_test_track("file:///music/a.flac", "A");
/// assert_eq!(track.title, Some("A".to_string()));
/// ```
pub fn create_test_track(uri: &str, title: &str) -> TrackMetadata {
    TrackMetadata {
        resource_uri: uri.to_owned(),
        file_modified_time: 1_700_000_000,
        title: Some(title.to_owned()),
        duration: Some(Duration::from_secs(180)),
        ..Default::default()
    }
}

/// Create a test track with the natural-key fields set
///
/// # Examples
///
/// ```
/// # use rmstore_core::test_utils::create_test_track_with_metadata;
/// let track = create_test_track_with_metadata(
///     "file:///music/m/1.flac",
///     "A",
///     Some("X"),
///     Some("M"),
///     Some(1),
/// );
/// assert_eq!(track.artist, Some("X".to_string()));
/// assert_eq!(track.track_number, Some(1));
/// ```
pub fn create_test_track_with_metadata(
    uri: &str,
    title: &str,
    artist: Option<&str>,
    album: Option<&str>,
    track_number: Option<u32>,
) -> TrackMetadata {
    TrackMetadata {
        artist: artist.map(String::from),
        album: album.map(String::from),
        track_number,
        disc_number: Some(1),
        ..create_test_track(uri, title)
    }
}
