//! Read-side result rows.
//!
//! Each query returns one of these purpose-built structs instead of a
//! generic property map, so the fields a query fills are visible in its
//! signature.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub database_id: u64,
    pub title: String,
    pub artist: Option<String>,
    pub album_id: u64,
    pub album: String,
    /// Album-artist tag, or the album's display artist when untagged
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration: Duration,
    pub resource_uri: String,
    pub album_cover: Option<String>,
    pub is_single_disc_album: bool,
    pub rating: u8,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub lyricist: Option<String>,
    pub lyrics: Option<String>,
    pub comment: Option<String>,
    pub year: Option<i32>,
    pub channels: Option<u8>,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub has_embedded_cover: bool,
    pub file_modified_time: i64,
    pub first_play_time: Option<i64>,
    pub last_play_time: Option<i64>,
    pub play_count: u32,
}

impl TrackData {
    pub fn display_artist(&self) -> &str {
        self.artist
            .as_deref()
            .or(self.album_artist.as_deref())
            .unwrap_or("Unknown Artist")
    }
}

/// Album row without its track list (partial data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumData {
    pub database_id: u64,
    pub title: String,
    pub artist: Option<String>,
    /// Set when the display artist comes from an album-artist tag
    pub album_artist: Option<String>,
    pub cover_uri: Option<String>,
    pub is_single_disc: bool,
    pub genres: Vec<String>,
    pub tracks_count: u32,
}

impl AlbumData {
    pub fn has_valid_artist(&self) -> bool {
        self.artist.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Row of the artists, composers or lyricists table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistData {
    pub database_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreData {
    pub database_id: u64,
    pub name: String,
}
