use crate::changes::ChangeTracker;
use crate::identity::{self, DuplicateQuery, NameTable};
use crate::schema::{self, SchemaOptions};
use crate::writer::{self, InsertBatch};
use rmstore_core::config::StoreConfig;
use rmstore_core::error::{Result, StoreError};
use rmstore_core::event::LibraryEvent;
use rmstore_core::model::GenreData;
use rmstore_core::track::TrackMetadata;
use rusqlite::{Connection, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub reset_on_schema_mismatch: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            reset_on_schema_mismatch: true,
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            reset_on_schema_mismatch: config.reset_on_schema_mismatch,
        }
    }
}

#[derive(Debug)]
pub struct Database {
    pub(crate) conn: Connection,
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(|_| {
            tracing::warn!("System time before UNIX_EPOCH, using 0");
            0
        })
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening library store: {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn, options)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, options)
    }

    fn from_connection(mut conn: Connection, options: StoreOptions) -> Result<Self> {
        let version = schema::initialize(
            &mut conn,
            SchemaOptions {
                reset_on_mismatch: options.reset_on_schema_mismatch,
            },
        )?;
        debug!("Library store ready at schema version {}", version);
        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> Result<u32> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Run `f` in one transaction with a fresh change accumulator. The
    /// accumulator is returned only when the transaction committed.
    pub(crate) fn in_transaction<F>(&mut self, operation: &str, f: F) -> Result<ChangeTracker>
    where
        F: FnOnce(&Transaction<'_>, &mut ChangeTracker) -> Result<()>,
    {
        let mut changes = ChangeTracker::new();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::Transaction(format!("{operation}: {e}")))?;

        if let Err(e) = f(&tx, &mut changes) {
            error!("{} failed, rolling back: {}", operation, e);
            return Err(StoreError::Transaction(format!("{operation}: {e}")));
        }

        tx.commit()
            .map_err(|e| StoreError::Transaction(format!("{operation}: {e}")))?;
        Ok(changes)
    }

    /// Insert or update a batch of scanned tracks in one transaction.
    ///
    /// `covers` maps album titles to cover-art URIs. On failure nothing is
    /// written and `changes` is left as it was.
    pub fn insert_tracks(
        &mut self,
        tracks: &[TrackMetadata],
        covers: &HashMap<String, String>,
        changes: &mut ChangeTracker,
    ) -> Result<()> {
        let import_time = unix_now();

        let batch = self.in_transaction("insert tracks", |tx, batch_changes| {
            let mut batch = InsertBatch::new(covers, import_time);
            for track in tracks {
                writer::insert_track(tx, track, &mut batch, batch_changes)?;
            }
            writer::refresh_albums(tx, batch.touched_albums(), batch_changes)?;
            writer::sweep_orphans(tx, batch_changes)?;
            Ok(())
        })?;

        info!(
            "Inserted batch of {} tracks: {} new, {} modified",
            tracks.len(),
            batch.tracks.inserted.len(),
            batch.tracks.modified.len()
        );
        changes.merge(batch);
        Ok(())
    }

    /// Delete the tracks stored at `uris`, then sweep what they leave
    /// unreferenced. Unknown URIs are skipped.
    pub fn remove_tracks_list(&mut self, uris: &[String], changes: &mut ChangeTracker) -> Result<()> {
        let batch = self.in_transaction("remove tracks", |tx, batch_changes| {
            let mut touched = BTreeSet::new();
            for uri in uris {
                if let Some(album_id) = writer::remove_track(tx, uri, batch_changes)? {
                    touched.insert(album_id);
                }
            }
            writer::refresh_albums(tx, &touched, batch_changes)?;
            writer::sweep_orphans(tx, batch_changes)?;
            Ok(())
        })?;

        info!(
            "Removed {} of {} tracks, {} albums emptied",
            batch.tracks.removed.len(),
            uris.len(),
            batch.albums.removed.len()
        );
        changes.merge(batch);
        Ok(())
    }

    /// Drop everything, track origins included, and recreate the schema.
    pub fn clear_data(&mut self) -> Result<()> {
        info!("Clearing library store");
        schema::reset_database(&mut self.conn)
    }

    pub fn album_id_from_title_and_artist(&self, title: &str, artist: Option<&str>) -> Result<Option<u64>> {
        Ok(identity::resolve_album(&self.conn, title, artist)?.map(|id| id as u64))
    }

    pub fn track_id_from_title_album_track_disc_number(
        &self,
        title: &str,
        artist: Option<&str>,
        album: Option<&str>,
        track_number: Option<u32>,
        disc_number: Option<u32>,
    ) -> Result<Option<u64>> {
        let query = DuplicateQuery {
            title: title.to_owned(),
            artist: artist.map(str::to_owned),
            album: album.map(str::to_owned),
            track_number,
            disc_number,
            ..Default::default()
        };
        Ok(identity::resolve_duplicate_track(&self.conn, &query)?.map(|id| id as u64))
    }

    pub fn track_id_from_file_name(&self, uri: &str) -> Result<Option<u64>> {
        Ok(identity::resolve_track_by_uri(&self.conn, uri)?.map(|id| id as u64))
    }

    /// Turn accumulated ids into events, leaving `changes` empty.
    ///
    /// Additions come first, then modifications, then removals from
    /// tracks up to artists. Ids whose rows no longer exist are skipped.
    pub fn drain_changes(&self, changes: &mut ChangeTracker) -> Result<Vec<LibraryEvent>> {
        let mut changes = std::mem::take(changes);
        changes.normalize();

        let mut events = Vec::new();

        let artists = self.names_data(NameTable::Artists, &changes.artists.inserted)?;
        if !artists.is_empty() {
            events.push(LibraryEvent::ArtistsAdded(artists));
        }

        let composers = self.names_data(NameTable::Composers, &changes.composers.inserted)?;
        if !composers.is_empty() {
            events.push(LibraryEvent::ComposersAdded(composers));
        }

        let lyricists = self.names_data(NameTable::Lyricists, &changes.lyricists.inserted)?;
        if !lyricists.is_empty() {
            events.push(LibraryEvent::LyricistsAdded(lyricists));
        }

        let mut albums = Vec::new();
        for &id in &changes.albums.inserted {
            albums.extend(self.album_data_from_database_id(id)?);
        }
        if !albums.is_empty() {
            events.push(LibraryEvent::AlbumsAdded(albums));
        }

        let mut tracks = Vec::new();
        for &id in &changes.tracks.inserted {
            tracks.extend(self.track_data_from_database_id(id)?);
        }
        if !tracks.is_empty() {
            events.push(LibraryEvent::TracksAdded(tracks));
        }

        let genres: Vec<GenreData> = self
            .names_data(NameTable::Genres, &changes.genres.inserted)?
            .into_iter()
            .map(|g| GenreData {
                database_id: g.database_id,
                name: g.name,
            })
            .collect();
        if !genres.is_empty() {
            events.push(LibraryEvent::GenresAdded(genres));
        }

        for &id in &changes.tracks.modified {
            if let Some(track) = self.track_data_from_database_id(id)? {
                events.push(LibraryEvent::TrackModified(track));
            }
        }

        for &id in &changes.albums.modified {
            if let Some(album) = self.album_data_from_database_id(id)? {
                events.push(LibraryEvent::AlbumModified { album, id });
            }
        }

        events.extend(changes.tracks.removed.iter().map(|&id| LibraryEvent::TrackRemoved(id)));
        events.extend(changes.albums.removed.iter().map(|&id| LibraryEvent::AlbumRemoved(id)));
        events.extend(changes.artists.removed.iter().map(|&id| LibraryEvent::ArtistRemoved(id)));

        Ok(events)
    }
}
