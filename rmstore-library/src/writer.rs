//! Steps of the write path. Every function here runs inside the
//! transaction opened by [`crate::Database`] and records what it touched
//! in the batch's [`ChangeTracker`].

use crate::changes::{ChangeTracker, Entity};
use crate::identity::{self, DuplicateQuery, NameTable};
use rmstore_core::error::{Result, StoreError};
use rmstore_core::track::TrackMetadata;
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Display artist of albums whose tracks come from several artists.
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// State shared by the tracks of one insert call.
pub struct InsertBatch<'a> {
    covers: &'a HashMap<String, String>,
    import_time: i64,
    touched_albums: BTreeSet<i64>,
}

impl<'a> InsertBatch<'a> {
    pub fn new(covers: &'a HashMap<String, String>, import_time: i64) -> Self {
        Self {
            covers,
            import_time,
            touched_albums: BTreeSet::new(),
        }
    }

    pub fn touched_albums(&self) -> &BTreeSet<i64> {
        &self.touched_albums
    }
}

const TRACK_ROW_COLUMNS: &str = "title, artist_id, album_id, album_artist_name, track_number, \
     disc_number, duration_ms, genre_id, composer_id, lyricist_id, comment, lyrics, year, \
     channels, bit_rate, sample_rate, rating, resource_uri, has_embedded_cover, file_modified_time";

/// Columns of `tracks` that come from the scanned file. Play statistics
/// and the priority rank are owned by the store and left out.
#[derive(Debug, Clone, PartialEq)]
struct TrackRow {
    title: String,
    artist_id: Option<i64>,
    album_id: i64,
    album_artist_name: Option<String>,
    track_number: Option<u32>,
    disc_number: Option<u32>,
    duration_ms: i64,
    genre_id: Option<i64>,
    composer_id: Option<i64>,
    lyricist_id: Option<i64>,
    comment: Option<String>,
    lyrics: Option<String>,
    year: Option<i32>,
    channels: Option<u8>,
    bit_rate: Option<u32>,
    sample_rate: Option<u32>,
    rating: u8,
    resource_uri: String,
    has_embedded_cover: bool,
    file_modified_time: i64,
}

impl TrackRow {
    fn values(&self) -> [&dyn ToSql; 20] {
        [
            &self.title,
            &self.artist_id,
            &self.album_id,
            &self.album_artist_name,
            &self.track_number,
            &self.disc_number,
            &self.duration_ms,
            &self.genre_id,
            &self.composer_id,
            &self.lyricist_id,
            &self.comment,
            &self.lyrics,
            &self.year,
            &self.channels,
            &self.bit_rate,
            &self.sample_rate,
            &self.rating,
            &self.resource_uri,
            &self.has_embedded_cover,
            &self.file_modified_time,
        ]
    }
}

struct ResolvedIds {
    artist: Option<i64>,
    album: i64,
    genre: Option<i64>,
    composer: Option<i64>,
    lyricist: Option<i64>,
}

fn track_row(track: &TrackMetadata, ids: &ResolvedIds) -> TrackRow {
    TrackRow {
        title: track.display_title().to_owned(),
        artist_id: ids.artist,
        album_id: ids.album,
        album_artist_name: track.album_artist.clone(),
        track_number: track.track_number,
        disc_number: track.disc_number,
        duration_ms: track.duration_ms(),
        genre_id: ids.genre,
        composer_id: ids.composer,
        lyricist_id: ids.lyricist,
        comment: track.comment.clone(),
        lyrics: track.lyrics.clone(),
        year: track.year,
        channels: track.channels,
        bit_rate: track.bit_rate,
        sample_rate: track.sample_rate,
        rating: track.rating.unwrap_or(0),
        resource_uri: track.resource_uri.clone(),
        has_embedded_cover: track.has_embedded_cover,
        file_modified_time: track.file_modified_time,
    }
}

fn load_track_row(conn: &Connection, id: i64) -> Result<TrackRow> {
    Ok(conn.query_row(
        &format!("SELECT {TRACK_ROW_COLUMNS} FROM tracks WHERE id = ?1"),
        params![id],
        |row| {
            Ok(TrackRow {
                title: row.get(0)?,
                artist_id: row.get(1)?,
                album_id: row.get(2)?,
                album_artist_name: row.get(3)?,
                track_number: row.get(4)?,
                disc_number: row.get(5)?,
                duration_ms: row.get(6)?,
                genre_id: row.get(7)?,
                composer_id: row.get(8)?,
                lyricist_id: row.get(9)?,
                comment: row.get(10)?,
                lyrics: row.get(11)?,
                year: row.get(12)?,
                channels: row.get(13)?,
                bit_rate: row.get(14)?,
                sample_rate: row.get(15)?,
                rating: row.get(16)?,
                resource_uri: row.get(17)?,
                has_embedded_cover: row.get(18)?,
                file_modified_time: row.get(19)?,
            })
        },
    )?)
}

fn insert_track_row(conn: &Connection, row: &TrackRow, priority: i64) -> Result<i64> {
    let placeholders = (1..=21)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let values = row.values();
    let priority: &dyn ToSql = &priority;

    conn.execute(
        &format!("INSERT INTO tracks ({TRACK_ROW_COLUMNS}, priority) VALUES ({placeholders})"),
        params_from_iter(values.iter().chain(std::iter::once(&priority))),
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_track_row(conn: &Connection, id: i64, row: &TrackRow) -> Result<()> {
    let assignments = TRACK_ROW_COLUMNS
        .split(", ")
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let values = row.values();
    let id: &dyn ToSql = &id;

    conn.execute(
        &format!("UPDATE tracks SET {assignments} WHERE id = ?21"),
        params_from_iter(values.iter().chain(std::iter::once(&id))),
    )?;
    Ok(())
}

/// Rank a new row below every stored track sharing its natural key.
fn next_priority(conn: &Connection, row: &TrackRow) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(priority), 0) + 1 FROM tracks
         WHERE title = ?1 AND album_id = ?2
           AND COALESCE(track_number, 0) = COALESCE(?3, 0)
           AND COALESCE(disc_number, 0) = COALESCE(?4, 0)",
        params![row.title, row.album_id, row.track_number, row.disc_number],
        |r| r.get(0),
    )?)
}

/// Look up a name row, inserting it when absent.
pub fn upsert_name(
    conn: &Connection,
    table: NameTable,
    name: &str,
    changes: &mut ChangeTracker,
) -> Result<i64> {
    if let Some(id) = identity::resolve_name(conn, table, name)? {
        return Ok(id);
    }

    let inserted = conn.execute(
        &format!("INSERT INTO {table} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING"),
        params![name],
    )?;

    let id = identity::resolve_name(conn, table, name)?.ok_or_else(|| {
        StoreError::Transaction(format!("{name:?} vanished from {table} after insert"))
    })?;

    if inserted > 0 {
        debug!("New {} row {}: {}", table, id, name);
        changes.record_inserted(table.entity(), id as u64);
    }
    Ok(id)
}

fn upsert_optional_name(
    conn: &Connection,
    table: NameTable,
    name: Option<&str>,
    changes: &mut ChangeTracker,
) -> Result<Option<i64>> {
    name.map(|n| upsert_name(conn, table, n, changes)).transpose()
}

fn create_album(
    conn: &Connection,
    title: &str,
    artist: Option<(&str, i64)>,
    tagged: bool,
    album_path: &str,
    cover: Option<&str>,
    changes: &mut ChangeTracker,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO albums (title, artist_name, artist_id, album_artist_tagged, album_path, cover_uri)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            title,
            artist.map(|(name, _)| name),
            artist.map(|(_, id)| id),
            tagged,
            album_path,
            cover,
        ],
    )?;

    let id = conn.last_insert_rowid();
    debug!("New album {}: {:?} by {:?}", id, title, artist.map(|(name, _)| name));
    changes.record_inserted(Entity::Album, id as u64);
    Ok(id)
}

/// Untagged album of the same title in the same directory under another
/// artist: the directory holds a compilation. Relabel that album as
/// [`VARIOUS_ARTISTS`] unless such an album already exists.
fn compilation_album(
    conn: &Connection,
    track: &TrackMetadata,
    title: &str,
    changes: &mut ChangeTracker,
) -> Result<Option<i64>> {
    let album_path = track.album_path();
    if title.is_empty() || album_path.is_empty() {
        return Ok(None);
    }

    let Some((id, artist_name)) =
        identity::resolve_album_in_directory(conn, title, album_path, &track.resource_uri)?
    else {
        return Ok(None);
    };

    if artist_name
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(VARIOUS_ARTISTS))
    {
        return Ok(Some(id));
    }

    if identity::resolve_album(conn, title, Some(VARIOUS_ARTISTS))?.is_some() {
        debug!("Compilation {:?} already exists, keeping album {} apart", title, id);
        return Ok(None);
    }

    let various_id = upsert_name(conn, NameTable::Artists, VARIOUS_ARTISTS, changes)?;
    conn.execute(
        "UPDATE albums SET artist_name = ?1, artist_id = ?2 WHERE id = ?3",
        params![VARIOUS_ARTISTS, various_id, id],
    )?;

    debug!("Album {} ({:?}) is a compilation", id, title);
    changes.record_modified(Entity::Album, id as u64);
    Ok(Some(id))
}

fn update_cover(conn: &Connection, album_id: i64, cover: &str, changes: &mut ChangeTracker) -> Result<()> {
    let updated = conn.execute(
        "UPDATE albums SET cover_uri = ?1 WHERE id = ?2 AND COALESCE(cover_uri, '') <> ?1",
        params![cover, album_id],
    )?;
    if updated > 0 {
        changes.record_modified(Entity::Album, album_id as u64);
    }
    Ok(())
}

/// An album first created from untagged tracks keeps its display artist
/// once a track names that artist as album artist.
fn mark_tagged(conn: &Connection, album_id: i64, changes: &mut ChangeTracker) -> Result<()> {
    let updated = conn.execute(
        "UPDATE albums SET album_artist_tagged = 1 WHERE id = ?1 AND album_artist_tagged = 0",
        params![album_id],
    )?;
    if updated > 0 {
        debug!("Album {} now carries an album-artist tag", album_id);
        changes.record_modified(Entity::Album, album_id as u64);
    }
    Ok(())
}

fn album_genre_ids(conn: &Connection, album_id: i64) -> Result<BTreeSet<i64>> {
    let mut stmt = conn.prepare_cached("SELECT genre_id FROM album_genres WHERE album_id = ?1")?;
    let ids = stmt
        .query_map(params![album_id], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(ids)
}

fn resolve_or_create_album(
    conn: &Connection,
    track: &TrackMetadata,
    artist_id: Option<i64>,
    album_artist_id: Option<i64>,
    batch: &InsertBatch<'_>,
    changes: &mut ChangeTracker,
) -> Result<i64> {
    let title = track.album.as_deref().unwrap_or("");
    let cover = batch.covers.get(title).map(String::as_str);

    let (display_artist, tagged) = match (track.album_artist.as_deref(), album_artist_id) {
        (Some(name), Some(id)) => (Some((name, id)), true),
        _ => (track.artist.as_deref().zip(artist_id), false),
    };

    let existing = match identity::resolve_album(conn, title, display_artist.map(|(name, _)| name))? {
        Some(id) => Some(id),
        None if !tagged => compilation_album(conn, track, title, changes)?,
        None => None,
    };

    match existing {
        Some(id) => {
            if tagged {
                mark_tagged(conn, id, changes)?;
            }
            if let Some(cover) = cover {
                update_cover(conn, id, cover, changes)?;
            }
            Ok(id)
        }
        None => create_album(
            conn,
            title,
            display_artist,
            tagged,
            track.album_path(),
            cover,
            changes,
        ),
    }
}

/// Stored track for the same file.
fn find_existing(conn: &Connection, track: &TrackMetadata) -> Result<Option<(i64, TrackRow)>> {
    match identity::resolve_track_by_uri(conn, &track.resource_uri)? {
        Some(id) => Ok(Some((id, load_track_row(conn, id)?))),
        None => Ok(None),
    }
}

/// Insert or update one scanned track together with the rows it refers to.
pub fn insert_track(
    conn: &Connection,
    track: &TrackMetadata,
    batch: &mut InsertBatch<'_>,
    changes: &mut ChangeTracker,
) -> Result<()> {
    let track = track.normalized();
    if track.resource_uri.is_empty() {
        warn!("Skipping track without resource URI: {:?}", track.title);
        return Ok(());
    }

    let artist_id = upsert_optional_name(conn, NameTable::Artists, track.artist.as_deref(), changes)?;
    let album_artist_id =
        upsert_optional_name(conn, NameTable::Artists, track.album_artist.as_deref(), changes)?;
    let ids = ResolvedIds {
        artist: artist_id,
        album: resolve_or_create_album(conn, &track, artist_id, album_artist_id, batch, changes)?,
        genre: upsert_optional_name(conn, NameTable::Genres, track.genre.as_deref(), changes)?,
        composer: upsert_optional_name(conn, NameTable::Composers, track.composer.as_deref(), changes)?,
        lyricist: upsert_optional_name(conn, NameTable::Lyricists, track.lyricist.as_deref(), changes)?,
    };
    let row = track_row(&track, &ids);

    match find_existing(conn, &track)? {
        Some((id, stored)) if stored == row => {
            debug!("Track {} unchanged: {}", id, row.resource_uri);
        }
        Some((id, stored)) => {
            // Album genres derive from its tracks
            let genres_before = if stored.genre_id != row.genre_id && stored.album_id == row.album_id {
                Some(album_genre_ids(conn, row.album_id)?)
            } else {
                None
            };

            update_track_row(conn, id, &row)?;
            debug!("Updated track {}: {}", id, row.resource_uri);
            changes.record_modified(Entity::Track, id as u64);

            if let Some(before) = genres_before {
                if album_genre_ids(conn, row.album_id)? != before {
                    changes.record_modified(Entity::Album, row.album_id as u64);
                }
            }
            batch.touched_albums.insert(stored.album_id);
            batch.touched_albums.insert(row.album_id);
        }
        None => {
            // Another file with the same content stays a row of its own,
            // ranked after the copies already stored
            if let Some(original) =
                identity::resolve_duplicate_track(conn, &DuplicateQuery::from_track(&track))?
            {
                debug!("{} duplicates track {}", track.resource_uri, original);
            }
            let priority = next_priority(conn, &row)?;
            let id = insert_track_row(conn, &row, priority)?;
            debug!("New track {}: {}", id, row.resource_uri);
            changes.record_inserted(Entity::Track, id as u64);
            batch.touched_albums.insert(row.album_id);
        }
    }

    upsert_track_origin(conn, &track.resource_uri, track.file_modified_time, batch.import_time)?;
    Ok(())
}

pub fn upsert_track_origin(
    conn: &Connection,
    uri: &str,
    file_modified_time: i64,
    import_time: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO track_origins (resource_uri, file_modified_time, import_time)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(resource_uri) DO UPDATE SET
             file_modified_time = excluded.file_modified_time,
             import_time = excluded.import_time",
        params![uri, file_modified_time, import_time],
    )?;
    Ok(())
}

/// Delete the track stored at `uri`. Returns its album, or `None` for an
/// unknown URI.
pub fn remove_track(conn: &Connection, uri: &str, changes: &mut ChangeTracker) -> Result<Option<i64>> {
    let found: Option<(i64, i64)> = conn
        .query_row(
            "SELECT id, album_id FROM tracks WHERE resource_uri = ?1",
            params![uri],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, album_id)) = found else {
        debug!("Not removing unknown track {}", uri);
        return Ok(None);
    };

    conn.execute("DELETE FROM tracks WHERE id = ?1", params![id])?;
    debug!("Removed track {}: {}", id, uri);
    changes.record_removed(Entity::Track, id as u64);
    Ok(Some(album_id))
}

/// Recompute the stored track count and single-disc flag of each album.
pub fn refresh_albums(
    conn: &Connection,
    album_ids: &BTreeSet<i64>,
    changes: &mut ChangeTracker,
) -> Result<()> {
    for &album_id in album_ids {
        let (count, discs): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT COALESCE(disc_number, 1))
             FROM tracks WHERE album_id = ?1",
            params![album_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        // Left for the sweep
        if count == 0 {
            continue;
        }

        let single_disc = discs <= 1;
        let updated = conn.execute(
            "UPDATE albums SET tracks_count = ?1, is_single_disc = ?2
             WHERE id = ?3 AND (tracks_count <> ?1 OR is_single_disc <> ?2)",
            params![count, single_disc, album_id],
        )?;
        if updated > 0 {
            changes.record_modified(Entity::Album, album_id as u64);
        }
    }
    Ok(())
}

const ORPHAN_QUERIES: &[(Entity, &str, &str)] = &[
    (
        Entity::Album,
        "albums",
        "SELECT id FROM albums
         WHERE NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.album_id = albums.id)",
    ),
    (
        Entity::Artist,
        "artists",
        "SELECT id FROM artists
         WHERE NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.artist_id = artists.id)
           AND NOT EXISTS (SELECT 1 FROM albums WHERE albums.artist_id = artists.id)",
    ),
    (
        Entity::Composer,
        "composers",
        "SELECT id FROM composers
         WHERE NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.composer_id = composers.id)",
    ),
    (
        Entity::Lyricist,
        "lyricists",
        "SELECT id FROM lyricists
         WHERE NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.lyricist_id = lyricists.id)",
    ),
    (
        Entity::Genre,
        "genres",
        "SELECT id FROM genres
         WHERE NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.genre_id = genres.id)",
    ),
];

/// Delete albums without tracks, then every name row nothing refers to.
/// Albums go first so their artists become unreferenced in the same pass.
pub fn sweep_orphans(conn: &Connection, changes: &mut ChangeTracker) -> Result<usize> {
    let mut removed = 0;

    for (entity, table, select) in ORPHAN_QUERIES {
        let mut stmt = conn.prepare(select)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for id in ids {
            conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
            debug!("Swept orphan {} row {}", table, id);
            changes.record_removed(*entity, id as u64);
            removed += 1;
        }
    }

    Ok(removed)
}
