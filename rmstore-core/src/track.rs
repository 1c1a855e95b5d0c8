use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flat per-file record handed to the store by the metadata extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Location of the audio file (`file:///...` or a stream URL)
    pub resource_uri: String,
    /// File modification time, seconds since the UNIX epoch
    pub file_modified_time: i64,

    // Core metadata
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration: Option<Duration>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub lyricist: Option<String>,
    pub comment: Option<String>,
    pub lyrics: Option<String>,
    pub rating: Option<u8>,

    // Audio properties
    pub channels: Option<u8>,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,

    pub has_embedded_cover: bool,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

impl TrackMetadata {
    /// Copy with blank text fields turned into `None` and numbers that
    /// taggers use as "unset" (zero) dropped.
    pub fn normalized(&self) -> Self {
        Self {
            resource_uri: self.resource_uri.trim().to_owned(),
            file_modified_time: self.file_modified_time,
            title: clean(&self.title),
            artist: clean(&self.artist),
            album: clean(&self.album),
            album_artist: clean(&self.album_artist),
            track_number: self.track_number.filter(|n| *n > 0),
            disc_number: self.disc_number.filter(|n| *n > 0),
            duration: self.duration,
            year: self.year.filter(|y| *y > 0),
            genre: clean(&self.genre),
            composer: clean(&self.composer),
            lyricist: clean(&self.lyricist),
            comment: clean(&self.comment),
            lyrics: clean(&self.lyrics),
            rating: self.rating,
            channels: self.channels,
            bit_rate: self.bit_rate,
            sample_rate: self.sample_rate,
            has_embedded_cover: self.has_embedded_cover,
        }
    }

    /// Title used for storage; falls back to the file name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| {
            self.resource_uri
                .rsplit('/')
                .find(|s| !s.is_empty())
                .unwrap_or("Unknown")
        })
    }

    /// Directory part of the resource URI, used to group album files.
    pub fn album_path(&self) -> &str {
        match self.resource_uri.rfind('/') {
            Some(pos) => &self.resource_uri[..pos],
            None => "",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration.map(|d| d.as_millis() as i64).unwrap_or(0)
    }
}
