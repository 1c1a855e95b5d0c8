use crate::model::{AlbumData, ArtistData, GenreData, TrackData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Notifications emitted by the library after each call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LibraryEvent {
    // Entities seen for the first time
    ArtistsAdded(Vec<ArtistData>),
    ComposersAdded(Vec<ArtistData>),
    LyricistsAdded(Vec<ArtistData>),
    AlbumsAdded(Vec<AlbumData>),
    TracksAdded(Vec<TrackData>),
    GenresAdded(Vec<GenreData>),

    // Removals
    ArtistRemoved(u64),
    AlbumRemoved(u64),
    TrackRemoved(u64),

    // Modifications of existing entities
    AlbumModified { album: AlbumData, id: u64 },
    TrackModified(TrackData),

    // Call lifecycle
    RequestsInitDone,
    InsertingTracksDone,
    RemovingTracksDone,
    DatabaseError,
    RestoredTracks(HashMap<String, i64>),
    DatabaseCleaned,
}

/// What part of the library an event touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subsystem {
    Artists,
    Composers,
    Lyricists,
    Albums,
    Tracks,
    Genres,
    Lifecycle,
}

impl LibraryEvent {
    pub fn subsystem(&self) -> Subsystem {
        match self {
            LibraryEvent::ArtistsAdded(_) | LibraryEvent::ArtistRemoved(_) => Subsystem::Artists,
            LibraryEvent::ComposersAdded(_) => Subsystem::Composers,
            LibraryEvent::LyricistsAdded(_) => Subsystem::Lyricists,
            LibraryEvent::AlbumsAdded(_)
            | LibraryEvent::AlbumRemoved(_)
            | LibraryEvent::AlbumModified { .. } => Subsystem::Albums,
            LibraryEvent::TracksAdded(_)
            | LibraryEvent::TrackRemoved(_)
            | LibraryEvent::TrackModified(_) => Subsystem::Tracks,
            LibraryEvent::GenresAdded(_) => Subsystem::Genres,
            LibraryEvent::RequestsInitDone
            | LibraryEvent::InsertingTracksDone
            | LibraryEvent::RemovingTracksDone
            | LibraryEvent::DatabaseError
            | LibraryEvent::RestoredTracks(_)
            | LibraryEvent::DatabaseCleaned => Subsystem::Lifecycle,
        }
    }
}

/// Central event bus
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LibraryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: LibraryEvent) {
        // Ignore errors - means no subscribers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
