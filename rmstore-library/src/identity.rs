//! Natural-key lookups used by the write path before it inserts anything.
//!
//! Every lookup answers `Ok(None)` when no row matches; the caller decides
//! whether to insert.

use crate::changes::Entity;
use rmstore_core::error::Result;
use rmstore_core::track::TrackMetadata;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;

/// Tables holding a single case-insensitive unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameTable {
    Artists,
    Composers,
    Lyricists,
    Genres,
}

impl NameTable {
    pub fn table_name(self) -> &'static str {
        match self {
            NameTable::Artists => "artists",
            NameTable::Composers => "composers",
            NameTable::Lyricists => "lyricists",
            NameTable::Genres => "genres",
        }
    }

    pub fn entity(self) -> Entity {
        match self {
            NameTable::Artists => Entity::Artist,
            NameTable::Composers => Entity::Composer,
            NameTable::Lyricists => Entity::Lyricist,
            NameTable::Genres => Entity::Genre,
        }
    }
}

impl fmt::Display for NameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

pub fn resolve_name(conn: &Connection, table: NameTable, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn resolve_album(conn: &Connection, title: &str, artist: Option<&str>) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM albums
             WHERE title = ?1 AND COALESCE(artist_name, '') = COALESCE(?2, '') COLLATE NOCASE",
            params![title, artist],
            |row| row.get(0),
        )
        .optional()?)
}

/// Album without an album-artist tag found in the same directory under
/// the same title, holding at least one file other than `uri`. Returns
/// its id and display artist.
pub fn resolve_album_in_directory(
    conn: &Connection,
    title: &str,
    album_path: &str,
    uri: &str,
) -> Result<Option<(i64, Option<String>)>> {
    Ok(conn
        .query_row(
            "SELECT id, artist_name FROM albums
             WHERE title = ?1 AND album_path = ?2 AND album_artist_tagged = 0
               AND EXISTS (SELECT 1 FROM tracks t
                           WHERE t.album_id = albums.id AND t.resource_uri <> ?3)
             ORDER BY id LIMIT 1",
            params![title, album_path, uri],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}

pub fn resolve_track_by_uri(conn: &Connection, uri: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM tracks WHERE resource_uri = ?1",
            params![uri],
            |row| row.get(0),
        )
        .optional()?)
}

/// Relaxation levels tried in order when looking for a track that holds
/// the same content under another file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLevel {
    /// Album artist and album directory must agree too
    Exact,
    AnyDirectory,
    /// A missing album artist on either side stands in for the track artist
    AlbumArtistFromTrackArtist,
    IgnoreAlbumArtist,
}

impl MatchLevel {
    pub const ORDER: [MatchLevel; 4] = [
        MatchLevel::Exact,
        MatchLevel::AnyDirectory,
        MatchLevel::AlbumArtistFromTrackArtist,
        MatchLevel::IgnoreAlbumArtist,
    ];

    fn clause(self) -> &'static str {
        match self {
            MatchLevel::Exact => {
                "COALESCE(t.album_artist_name, '') = COALESCE(?6, '') COLLATE NOCASE
                 AND substr(t.resource_uri, 1, length(?7) + 1) = ?7 || '/'
                 AND instr(substr(t.resource_uri, length(?7) + 2), '/') = 0"
            }
            MatchLevel::AnyDirectory => {
                "COALESCE(t.album_artist_name, '') = COALESCE(?6, '') COLLATE NOCASE"
            }
            MatchLevel::AlbumArtistFromTrackArtist => {
                "COALESCE(t.album_artist_name, ar.name, '') = COALESCE(?6, ?2, '') COLLATE NOCASE"
            }
            MatchLevel::IgnoreAlbumArtist => "1",
        }
    }
}

/// Natural key of a prospective track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateQuery {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub album_path: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// Row never reported as its own duplicate
    pub exclude_id: Option<i64>,
}

impl DuplicateQuery {
    pub fn from_track(track: &TrackMetadata) -> Self {
        Self {
            title: track.display_title().to_owned(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            album_artist: track.album_artist.clone(),
            album_path: track.album_path().to_owned(),
            track_number: track.track_number,
            disc_number: track.disc_number,
            exclude_id: None,
        }
    }
}

pub fn resolve_duplicate_track_at(
    conn: &Connection,
    query: &DuplicateQuery,
    level: MatchLevel,
) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT t.id FROM tracks t
         JOIN albums al ON al.id = t.album_id
         LEFT JOIN artists ar ON ar.id = t.artist_id
         WHERE t.title = ?1
           AND COALESCE(ar.name, '') = COALESCE(?2, '') COLLATE NOCASE
           AND al.title = COALESCE(?3, '')
           AND COALESCE(t.track_number, 0) = COALESCE(?4, 0)
           AND COALESCE(t.disc_number, 0) = COALESCE(?5, 0)
           AND ({})
           AND (?8 IS NULL OR t.id <> ?8)
         ORDER BY t.priority, t.id
         LIMIT 1",
        level.clause()
    );

    Ok(conn
        .query_row(
            &sql,
            params![
                query.title,
                query.artist,
                query.album,
                query.track_number,
                query.disc_number,
                query.album_artist,
                query.album_path,
                query.exclude_id,
            ],
            |row| row.get(0),
        )
        .optional()?)
}

/// First existing track matching `query`, trying each [`MatchLevel`] in
/// order. Within a level the lowest priority rank wins, then the lowest id.
pub fn resolve_duplicate_track(conn: &Connection, query: &DuplicateQuery) -> Result<Option<i64>> {
    for level in MatchLevel::ORDER {
        if let Some(id) = resolve_duplicate_track_at(conn, query, level)? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}
