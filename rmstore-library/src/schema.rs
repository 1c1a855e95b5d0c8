//! Schema management: fresh creation, version detection, migrations and
//! structural validation of an existing store.
//!
//! The store version lives in `PRAGMA user_version`. Stores written before
//! the pragma was maintained carry version 0 and are classified by probing
//! for the tables and columns each version introduced.

use rmstore_core::error::{Result, StoreError};
use rusqlite::{Connection, Transaction};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

pub struct Column {
    pub name: &'static str,
    pub definition: &'static str,
}

const fn col(name: &'static str, definition: &'static str) -> Column {
    Column { name, definition }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub constraints: &'static [&'static str],
    pub indices: &'static [(&'static str, &'static str)],
}

pub struct View {
    pub name: &'static str,
    pub select: &'static str,
}

impl Table {
    fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.definition))
            .collect();
        parts.extend(self.constraints.iter().map(|c| c.to_string()));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            parts.join(", ")
        )
    }

    pub fn create(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(&self.create_sql(), [])?;
        self.create_indices(conn)
    }

    fn create_indices(&self, conn: &Connection) -> rusqlite::Result<()> {
        for (index_name, columns) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    index_name, self.name, columns
                ),
                [],
            )?;
        }
        Ok(())
    }
}

impl View {
    pub fn create(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            &format!("CREATE VIEW IF NOT EXISTS {} AS {}", self.name, self.select),
            [],
        )?;
        Ok(())
    }
}

// Column order follows the order in which versions appended them, so a
// migrated store and a fresh one lay out identically.

const NAME_COLUMNS: &[Column] = &[
    col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
    col("name", "TEXT NOT NULL UNIQUE COLLATE NOCASE"),
];

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: NAME_COLUMNS,
    constraints: &[],
    indices: &[],
};

const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: NAME_COLUMNS,
    constraints: &[],
    indices: &[],
};

const COMPOSERS_TABLE: Table = Table {
    name: "composers",
    columns: NAME_COLUMNS,
    constraints: &[],
    indices: &[],
};

const LYRICISTS_TABLE: Table = Table {
    name: "lyricists",
    columns: NAME_COLUMNS,
    constraints: &[],
    indices: &[],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
        col("title", "TEXT NOT NULL COLLATE NOCASE"),
        col("artist_name", "TEXT COLLATE NOCASE"),
        col(
            "artist_id",
            "INTEGER REFERENCES artists(id) ON DELETE SET NULL",
        ),
        col("album_artist_tagged", "INTEGER NOT NULL DEFAULT 0"),
        col("album_path", "TEXT"),
        col("cover_uri", "TEXT"),
        col("is_single_disc", "INTEGER NOT NULL DEFAULT 1"),
        col("tracks_count", "INTEGER NOT NULL DEFAULT 0"),
    ],
    constraints: &["UNIQUE (title, artist_name)"],
    indices: &[
        ("idx_albums_artist", "artist_id"),
        ("idx_albums_path", "album_path"),
    ],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        // Version 1
        col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
        col("title", "TEXT NOT NULL COLLATE NOCASE"),
        col("artist_id", "INTEGER REFERENCES artists(id)"),
        col(
            "album_id",
            "INTEGER NOT NULL REFERENCES albums(id) ON DELETE CASCADE",
        ),
        col("album_artist_name", "TEXT COLLATE NOCASE"),
        col("track_number", "INTEGER"),
        col("disc_number", "INTEGER"),
        col("duration_ms", "INTEGER NOT NULL DEFAULT 0"),
        col("genre_id", "INTEGER REFERENCES genres(id)"),
        col("comment", "TEXT"),
        col("year", "INTEGER"),
        col("channels", "INTEGER"),
        col("bit_rate", "INTEGER"),
        col("sample_rate", "INTEGER"),
        col("rating", "INTEGER NOT NULL DEFAULT 0"),
        col("resource_uri", "TEXT NOT NULL UNIQUE"),
        col("file_modified_time", "INTEGER NOT NULL"),
        // Version 2
        col("composer_id", "INTEGER REFERENCES composers(id)"),
        col("lyricist_id", "INTEGER REFERENCES lyricists(id)"),
        // Version 3
        col("first_play_time", "INTEGER"),
        col("last_play_time", "INTEGER"),
        col("play_count", "INTEGER NOT NULL DEFAULT 0"),
        // Version 4
        col("priority", "INTEGER NOT NULL DEFAULT 1"),
        col("lyrics", "TEXT"),
        col("has_embedded_cover", "INTEGER NOT NULL DEFAULT 0"),
    ],
    constraints: &[],
    indices: &[
        ("idx_tracks_album", "album_id"),
        ("idx_tracks_artist", "artist_id"),
        ("idx_tracks_genre", "genre_id"),
        ("idx_tracks_natural_key", "title, album_id, track_number, disc_number"),
        ("idx_tracks_last_play", "last_play_time"),
    ],
};

const TRACK_ORIGINS_TABLE: Table = Table {
    name: "track_origins",
    columns: &[
        col("resource_uri", "TEXT PRIMARY KEY"),
        col("file_modified_time", "INTEGER NOT NULL"),
        col("import_time", "INTEGER NOT NULL"),
    ],
    constraints: &[],
    indices: &[],
};

/// Distinct genres carried by the tracks of each album
const ALBUM_GENRES_VIEW: View = View {
    name: "album_genres",
    select: "SELECT DISTINCT t.album_id AS album_id, g.id AS genre_id, g.name AS name
             FROM tracks t JOIN genres g ON g.id = t.genre_id",
};

/// Tables of the latest version, parents before children.
pub const TABLES: &[Table] = &[
    ARTISTS_TABLE,
    GENRES_TABLE,
    COMPOSERS_TABLE,
    LYRICISTS_TABLE,
    ALBUMS_TABLE,
    TRACKS_TABLE,
    TRACK_ORIGINS_TABLE,
];

pub const VIEWS: &[View] = &[ALBUM_GENRES_VIEW];

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

/// Upgrade steps, applied in order to reach `version`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        description: "composers and lyricists",
        apply: migrate_to_v2,
    },
    Migration {
        version: 3,
        description: "play statistics",
        apply: migrate_to_v3,
    },
    Migration {
        version: 4,
        description: "duplicate priority, lyrics, embedded covers",
        apply: migrate_to_v4,
    },
];

pub const LATEST_VERSION: u32 = 4;

fn migrate_to_v2(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    COMPOSERS_TABLE.create(tx)?;
    LYRICISTS_TABLE.create(tx)?;
    add_column_if_missing(tx, "tracks", "composer_id", "INTEGER REFERENCES composers(id)")?;
    add_column_if_missing(tx, "tracks", "lyricist_id", "INTEGER REFERENCES lyricists(id)")?;
    Ok(())
}

fn migrate_to_v3(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    add_column_if_missing(tx, "tracks", "first_play_time", "INTEGER")?;
    add_column_if_missing(tx, "tracks", "last_play_time", "INTEGER")?;
    add_column_if_missing(tx, "tracks", "play_count", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

fn migrate_to_v4(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    add_column_if_missing(tx, "tracks", "priority", "INTEGER NOT NULL DEFAULT 1")?;
    add_column_if_missing(tx, "tracks", "lyrics", "TEXT")?;
    add_column_if_missing(tx, "tracks", "has_embedded_cover", "INTEGER NOT NULL DEFAULT 0")?;
    TRACKS_TABLE.create_indices(tx)?;
    ALBUM_GENRES_VIEW.create(tx)?;
    Ok(())
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> rusqlite::Result<()> {
    if column_exists(conn, table, column)? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
        [],
    )?;
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(columns)
}

fn schema_error(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| StoreError::Schema(format!("{context}: {e}"))
}

/// A table whose columns differ from the expected set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub table: &'static str,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table {} (missing: [{}], unexpected: [{}])",
            self.table,
            self.missing.join(", "),
            self.unexpected.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaOptions {
    pub reset_on_mismatch: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            reset_on_mismatch: true,
        }
    }
}

/// On-disk version, or `None` when the store holds no schema yet.
pub fn detect_version(conn: &Connection) -> Result<Option<u32>> {
    let probe = || -> rusqlite::Result<Option<u32>> {
        if !table_exists(conn, "tracks")? {
            return Ok(None);
        }

        let user_version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if user_version > 0 {
            return Ok(Some(user_version));
        }

        let version = if column_exists(conn, "tracks", "priority")? {
            4
        } else if column_exists(conn, "tracks", "play_count")? {
            3
        } else if table_exists(conn, "composers")? {
            2
        } else {
            1
        };
        Ok(Some(version))
    };

    probe().map_err(schema_error("Failed to detect schema version"))
}

/// Bring the store to the latest version, validating its structure.
pub fn initialize(conn: &mut Connection, options: SchemaOptions) -> Result<u32> {
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(schema_error("Failed to enable foreign keys"))?;

    match detect_version(conn)? {
        None => {
            info!("No existing schema, creating version {}", LATEST_VERSION);
            create_fresh_schema(conn)?;
        }
        Some(version) if version > LATEST_VERSION => {
            return Err(StoreError::Schema(format!(
                "store version {version} is newer than supported version {LATEST_VERSION}"
            )));
        }
        Some(version) => {
            debug!("Detected schema version {}", version);
            migrate(conn, version)?;
        }
    }

    let mismatches = validate_schema(conn)?;
    if !mismatches.is_empty() {
        let description = mismatches
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        if !options.reset_on_mismatch {
            return Err(StoreError::Schema(format!(
                "store structure does not match: {description}"
            )));
        }

        warn!("Store structure does not match ({}), resetting", description);
        reset_database(conn)?;
    }

    for table in TABLES {
        table
            .create_indices(conn)
            .map_err(schema_error("Failed to create indices"))?;
    }
    for view in VIEWS {
        view.create(conn).map_err(schema_error("Failed to create views"))?;
    }

    Ok(LATEST_VERSION)
}

/// Create every table, index and view of the latest version in one transaction.
pub fn create_fresh_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(schema_error("Failed to begin schema transaction"))?;
    create_all(&tx).map_err(schema_error("Failed to create schema"))?;
    tx.commit()
        .map_err(schema_error("Failed to commit schema creation"))?;
    Ok(())
}

fn create_all(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    for table in TABLES {
        table.create(tx)?;
    }
    for view in VIEWS {
        view.create(tx)?;
    }
    tx.pragma_update(None, "user_version", LATEST_VERSION)?;
    Ok(())
}

/// Apply every migration newer than `from_version`, one transaction each.
pub fn migrate(conn: &mut Connection, from_version: u32) -> Result<()> {
    for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
        info!(
            "Migrating store to version {} ({})",
            migration.version, migration.description
        );

        let tx = conn.transaction().map_err(|e| {
            StoreError::Schema(format!("migration to {} failed: {e}", migration.version))
        })?;
        (migration.apply)(&tx)
            .and_then(|_| tx.pragma_update(None, "user_version", migration.version))
            .and_then(|_| tx.commit())
            .map_err(|e| {
                StoreError::Schema(format!("migration to {} failed: {e}", migration.version))
            })?;
    }

    // Stores detected by probing still carry user_version 0
    conn.pragma_update(None, "user_version", LATEST_VERSION)
        .map_err(schema_error("Failed to record schema version"))?;
    Ok(())
}

/// Compare the columns of every known table with the expected set.
pub fn validate_schema(conn: &Connection) -> Result<Vec<SchemaMismatch>> {
    let mut mismatches = Vec::new();

    for table in TABLES {
        let actual = table_columns(conn, table.name)
            .map_err(schema_error("Failed to read table structure"))?;
        let expected: BTreeSet<String> =
            table.columns.iter().map(|c| c.name.to_owned()).collect();

        if actual == expected {
            continue;
        }

        mismatches.push(SchemaMismatch {
            table: table.name,
            missing: expected.difference(&actual).cloned().collect(),
            unexpected: actual.difference(&expected).cloned().collect(),
        });
    }

    Ok(mismatches)
}

/// Drop every table and view and recreate the latest schema.
pub fn reset_database(conn: &mut Connection) -> Result<()> {
    info!("Resetting store to an empty version {} schema", LATEST_VERSION);

    let tx = conn
        .transaction()
        .map_err(schema_error("Failed to begin reset"))?;

    let reset = |tx: &Transaction<'_>| -> rusqlite::Result<()> {
        for view in VIEWS {
            tx.execute(&format!("DROP VIEW IF EXISTS {}", view.name), [])?;
        }
        // Children first so foreign keys never dangle
        for table in TABLES.iter().rev() {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", table.name), [])?;
        }
        create_all(tx)
    };

    reset(&tx).map_err(schema_error("Failed to reset store"))?;
    tx.commit().map_err(schema_error("Failed to commit reset"))?;
    Ok(())
}
