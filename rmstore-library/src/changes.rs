//! Per-call accumulator of inserted, modified and removed entity ids.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Artist,
    Composer,
    Lyricist,
    Genre,
    Album,
    Track,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntityChanges {
    pub inserted: BTreeSet<u64>,
    pub modified: BTreeSet<u64>,
    pub removed: BTreeSet<u64>,
}

impl EntityChanges {
    fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    fn merge(&mut self, other: EntityChanges) {
        self.inserted.extend(other.inserted);
        self.modified.extend(other.modified);
        self.removed.extend(other.removed);
    }

    fn normalize(&mut self) {
        let transient: Vec<u64> = self.inserted.intersection(&self.removed).copied().collect();
        for id in transient {
            self.inserted.remove(&id);
            self.removed.remove(&id);
            self.modified.remove(&id);
        }

        let inserted = &self.inserted;
        let removed = &self.removed;
        self.modified
            .retain(|id| !inserted.contains(id) && !removed.contains(id));
    }
}

/// Ids touched by one write call.
///
/// The write path fills a fresh tracker per transaction and merges it into
/// the caller's tracker only after commit, so a rolled back batch leaves no
/// trace. [`crate::Database::drain_changes`] turns the result into events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeTracker {
    pub artists: EntityChanges,
    pub composers: EntityChanges,
    pub lyricists: EntityChanges,
    pub genres: EntityChanges,
    pub albums: EntityChanges,
    pub tracks: EntityChanges,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, entity: Entity) -> &EntityChanges {
        match entity {
            Entity::Artist => &self.artists,
            Entity::Composer => &self.composers,
            Entity::Lyricist => &self.lyricists,
            Entity::Genre => &self.genres,
            Entity::Album => &self.albums,
            Entity::Track => &self.tracks,
        }
    }

    fn entity_mut(&mut self, entity: Entity) -> &mut EntityChanges {
        match entity {
            Entity::Artist => &mut self.artists,
            Entity::Composer => &mut self.composers,
            Entity::Lyricist => &mut self.lyricists,
            Entity::Genre => &mut self.genres,
            Entity::Album => &mut self.albums,
            Entity::Track => &mut self.tracks,
        }
    }

    pub fn record_inserted(&mut self, entity: Entity, id: u64) {
        self.entity_mut(entity).inserted.insert(id);
    }

    pub fn record_modified(&mut self, entity: Entity, id: u64) {
        self.entity_mut(entity).modified.insert(id);
    }

    pub fn record_removed(&mut self, entity: Entity, id: u64) {
        self.entity_mut(entity).removed.insert(id);
    }

    pub fn merge(&mut self, other: ChangeTracker) {
        self.artists.merge(other.artists);
        self.composers.merge(other.composers);
        self.lyricists.merge(other.lyricists);
        self.genres.merge(other.genres);
        self.albums.merge(other.albums);
        self.tracks.merge(other.tracks);
    }

    pub fn is_empty(&self) -> bool {
        [
            &self.artists,
            &self.composers,
            &self.lyricists,
            &self.genres,
            &self.albums,
            &self.tracks,
        ]
        .iter()
        .all(|changes| changes.is_empty())
    }

    /// Drop ids that appeared and vanished within the call, and
    /// modifications of entities that were also inserted or removed.
    pub fn normalize(&mut self) {
        self.artists.normalize();
        self.composers.normalize();
        self.lyricists.normalize();
        self.genres.normalize();
        self.albums.normalize();
        self.tracks.normalize();
    }
}
