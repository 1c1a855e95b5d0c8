use crate::changes::{ChangeTracker, Entity};
use crate::database::Database;
use crate::identity;
use rmstore_core::error::Result;
use rusqlite::params;
use tracing::debug;

impl Database {
    /// Record that the track at `uri` started playing at `timestamp`
    /// (seconds since the UNIX epoch).
    ///
    /// The first play time is set once, the last play time on every call.
    /// Playback reports can race with removals, so an unknown URI is
    /// silently ignored.
    pub fn track_has_started_playing(
        &mut self,
        uri: &str,
        timestamp: i64,
        changes: &mut ChangeTracker,
    ) -> Result<()> {
        let batch = self.in_transaction("play statistics", |tx, batch_changes| {
            let Some(id) = identity::resolve_track_by_uri(tx, uri)? else {
                debug!("Play reported for unknown track {}", uri);
                return Ok(());
            };

            tx.execute(
                "UPDATE tracks SET
                     first_play_time = COALESCE(first_play_time, ?2),
                     last_play_time = ?2,
                     play_count = play_count + 1
                 WHERE id = ?1",
                params![id, timestamp],
            )?;
            batch_changes.record_modified(Entity::Track, id as u64);
            Ok(())
        })?;

        changes.merge(batch);
        Ok(())
    }
}
