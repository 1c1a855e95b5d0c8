//! Read-only queries producing the result rows of `rmstore_core::model`.
//!
//! Single-entity lookups return `Ok(None)` when the row does not exist.

use crate::database::Database;
use crate::identity::NameTable;
use rmstore_core::error::Result;
use rmstore_core::model::{AlbumData, ArtistData, GenreData, TrackData};
use rusqlite::{params, OptionalExtension, Params, Row};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

const TRACK_SELECT: &str = "
    SELECT t.id, t.title, ar.name, t.album_id, al.title,
           COALESCE(t.album_artist_name, al.artist_name),
           t.track_number, t.disc_number, t.duration_ms, t.resource_uri,
           al.cover_uri, al.is_single_disc, t.rating, g.name, c.name, l.name,
           t.lyrics, t.comment, t.year, t.channels, t.bit_rate, t.sample_rate,
           t.has_embedded_cover, t.file_modified_time, t.first_play_time,
           t.last_play_time, t.play_count
    FROM tracks t
    JOIN albums al ON al.id = t.album_id
    LEFT JOIN artists ar ON ar.id = t.artist_id
    LEFT JOIN genres g ON g.id = t.genre_id
    LEFT JOIN composers c ON c.id = t.composer_id
    LEFT JOIN lyricists l ON l.id = t.lyricist_id";

/// Stored count stands in until the album has tracks of its own.
const ALBUM_SELECT: &str = "
    SELECT al.id, al.title, al.artist_name, al.album_artist_tagged, al.cover_uri,
           al.is_single_disc,
           COALESCE(NULLIF((SELECT COUNT(*) FROM tracks t WHERE t.album_id = al.id), 0),
                    al.tracks_count)
    FROM albums al";

const ALBUM_TRACK_ORDER: &str =
    "ORDER BY COALESCE(t.disc_number, 1), t.track_number IS NULL, t.track_number, t.title, t.id";

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<TrackData> {
    Ok(TrackData {
        database_id: row.get::<_, i64>(0)? as u64,
        title: row.get(1)?,
        artist: row.get(2)?,
        album_id: row.get::<_, i64>(3)? as u64,
        album: row.get(4)?,
        album_artist: row.get(5)?,
        track_number: row.get(6)?,
        disc_number: row.get(7)?,
        duration: Duration::from_millis(row.get::<_, i64>(8)?.max(0) as u64),
        resource_uri: row.get(9)?,
        album_cover: row.get(10)?,
        is_single_disc_album: row.get(11)?,
        rating: row.get(12)?,
        genre: row.get(13)?,
        composer: row.get(14)?,
        lyricist: row.get(15)?,
        lyrics: row.get(16)?,
        comment: row.get(17)?,
        year: row.get(18)?,
        channels: row.get(19)?,
        bit_rate: row.get(20)?,
        sample_rate: row.get(21)?,
        has_embedded_cover: row.get(22)?,
        file_modified_time: row.get(23)?,
        first_play_time: row.get(24)?,
        last_play_time: row.get(25)?,
        play_count: row.get(26)?,
    })
}

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<AlbumData> {
    let artist: Option<String> = row.get(2)?;
    let tagged: bool = row.get(3)?;

    Ok(AlbumData {
        database_id: row.get::<_, i64>(0)? as u64,
        title: row.get(1)?,
        album_artist: if tagged { artist.clone() } else { None },
        artist,
        cover_uri: row.get(4)?,
        is_single_disc: row.get(5)?,
        genres: Vec::new(),
        tracks_count: row.get(6)?,
    })
}

fn name_from_row(row: &Row<'_>) -> rusqlite::Result<ArtistData> {
    Ok(ArtistData {
        database_id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
    })
}

impl Database {
    fn query_tracks<P: Params>(&self, filter: &str, params: P) -> Result<Vec<TrackData>> {
        let mut stmt = self.conn.prepare(&format!("{TRACK_SELECT} {filter}"))?;
        let tracks = stmt
            .query_map(params, track_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn query_albums<P: Params>(&self, filter: &str, params: P) -> Result<Vec<AlbumData>> {
        let mut stmt = self.conn.prepare(&format!("{ALBUM_SELECT} {filter}"))?;
        let mut albums = stmt
            .query_map(params, album_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for album in &mut albums {
            album.genres = self.album_genres(album.database_id)?;
        }
        Ok(albums)
    }

    fn album_genres(&self, album_id: u64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name FROM album_genres WHERE album_id = ?1 ORDER BY name")?;
        let genres = stmt
            .query_map(params![album_id as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(genres)
    }

    fn all_names(&self, table: NameTable) -> Result<Vec<ArtistData>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, name FROM {table} ORDER BY name, id"))?;
        let names = stmt
            .query_map([], name_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn name_data(&self, table: NameTable, id: u64) -> Result<Option<ArtistData>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT id, name FROM {table} WHERE id = ?1"),
                params![id as i64],
                name_from_row,
            )
            .optional()?)
    }

    pub(crate) fn names_data(&self, table: NameTable, ids: &BTreeSet<u64>) -> Result<Vec<ArtistData>> {
        let mut names = Vec::with_capacity(ids.len());
        for &id in ids {
            names.extend(self.name_data(table, id)?);
        }
        Ok(names)
    }

    pub fn all_tracks_data(&self) -> Result<Vec<TrackData>> {
        self.query_tracks("ORDER BY t.id", [])
    }

    pub fn all_albums_data(&self) -> Result<Vec<AlbumData>> {
        self.query_albums("ORDER BY al.title, al.id", [])
    }

    pub fn all_artists_data(&self) -> Result<Vec<ArtistData>> {
        self.all_names(NameTable::Artists)
    }

    pub fn all_composers_data(&self) -> Result<Vec<ArtistData>> {
        self.all_names(NameTable::Composers)
    }

    pub fn all_lyricists_data(&self) -> Result<Vec<ArtistData>> {
        self.all_names(NameTable::Lyricists)
    }

    pub fn all_genres_data(&self) -> Result<Vec<GenreData>> {
        Ok(self
            .all_names(NameTable::Genres)?
            .into_iter()
            .map(|g| GenreData {
                database_id: g.database_id,
                name: g.name,
            })
            .collect())
    }

    /// Albums credited to `artist` or holding at least one of their tracks.
    pub fn all_albums_data_by_artist(&self, artist: &str) -> Result<Vec<AlbumData>> {
        self.query_albums(
            "WHERE al.artist_name = ?1
                OR EXISTS (SELECT 1 FROM tracks t JOIN artists ar ON ar.id = t.artist_id
                           WHERE t.album_id = al.id AND ar.name = ?1)
             ORDER BY al.title, al.id",
            params![artist],
        )
    }

    pub fn all_albums_data_by_genre_and_artist(&self, genre: &str, artist: &str) -> Result<Vec<AlbumData>> {
        self.query_albums(
            "WHERE (al.artist_name = ?2
                    OR EXISTS (SELECT 1 FROM tracks t JOIN artists ar ON ar.id = t.artist_id
                               WHERE t.album_id = al.id AND ar.name = ?2))
               AND EXISTS (SELECT 1 FROM album_genres ag
                           WHERE ag.album_id = al.id AND ag.name = ?1 COLLATE NOCASE)
             ORDER BY al.title, al.id",
            params![genre, artist],
        )
    }

    pub fn all_artists_data_by_genre(&self, genre: &str) -> Result<Vec<ArtistData>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT ar.id, ar.name FROM artists ar
             JOIN tracks t ON t.artist_id = ar.id
             JOIN genres g ON g.id = t.genre_id
             WHERE g.name = ?1
             ORDER BY ar.name, ar.id",
        )?;
        let artists = stmt
            .query_map(params![genre], name_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    /// Whether any track by the artist carries the genre.
    pub fn artist_matches_genre(&self, artist_id: u64, genre: &str) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM tracks t JOIN genres g ON g.id = t.genre_id
                            WHERE t.artist_id = ?1 AND g.name = ?2)",
            params![artist_id as i64, genre],
            |row| row.get(0),
        )?)
    }

    pub fn album_data_from_database_id(&self, id: u64) -> Result<Option<AlbumData>> {
        Ok(self
            .query_albums("WHERE al.id = ?1", params![id as i64])?
            .into_iter()
            .next())
    }

    /// Tracks of the album ordered by disc, track number and title.
    pub fn album_data(&self, id: u64) -> Result<Vec<TrackData>> {
        self.query_tracks(
            &format!("WHERE t.album_id = ?1 {ALBUM_TRACK_ORDER}"),
            params![id as i64],
        )
    }

    pub fn track_data_from_database_id(&self, id: u64) -> Result<Option<TrackData>> {
        Ok(self
            .conn
            .query_row(
                &format!("{TRACK_SELECT} WHERE t.id = ?1"),
                params![id as i64],
                track_from_row,
            )
            .optional()?)
    }

    /// Tracks performed by `artist` or on albums credited to them.
    pub fn tracks_data_from_author(&self, artist: &str) -> Result<Vec<TrackData>> {
        self.query_tracks(
            "WHERE ar.name = ?1 OR t.album_artist_name = ?1
             ORDER BY al.title, COALESCE(t.disc_number, 1), t.track_number IS NULL,
                      t.track_number, t.title, t.id",
            params![artist],
        )
    }

    pub fn recently_played_tracks_data(&self, count: usize) -> Result<Vec<TrackData>> {
        self.query_tracks(
            "WHERE t.last_play_time IS NOT NULL
             ORDER BY t.last_play_time DESC, t.id ASC
             LIMIT ?1",
            params![count as i64],
        )
    }

    pub fn frequently_played_tracks_data(&self, count: usize) -> Result<Vec<TrackData>> {
        self.query_tracks(
            "WHERE t.play_count > 0
             ORDER BY t.play_count DESC, t.id ASC
             LIMIT ?1",
            params![count as i64],
        )
    }

    /// Every URI ever imported with its last known modification time,
    /// including files whose track has since been removed.
    pub fn ask_restored_tracks(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT resource_uri, file_modified_time FROM track_origins")?;
        let restored = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, i64>>>()?;
        Ok(restored)
    }

    pub fn count_tracks(&self) -> Result<u32> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?)
    }

    pub fn count_albums(&self) -> Result<u32> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))?)
    }

    pub fn count_artists(&self) -> Result<u32> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?)
    }
}
