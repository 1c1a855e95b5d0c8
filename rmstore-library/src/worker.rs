//! The single writer: a dedicated thread that owns the [`Database`] and
//! executes commands one at a time, publishing the resulting events.

use crate::changes::ChangeTracker;
use crate::database::Database;
use rmstore_core::error::{Result, StoreError};
use rmstore_core::event::{EventBus, LibraryEvent};
use rmstore_core::track::TrackMetadata;
use std::collections::HashMap;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

type QueryFn = Box<dyn FnOnce(&Database) + Send>;

/// Command sent to the worker thread.
enum Command {
    InsertTracks {
        tracks: Vec<TrackMetadata>,
        covers: HashMap<String, String>,
        response: oneshot::Sender<Result<()>>,
    },
    RemoveTracks {
        uris: Vec<String>,
        response: oneshot::Sender<Result<()>>,
    },
    TrackStartedPlaying {
        uri: String,
        timestamp: i64,
        response: oneshot::Sender<Result<()>>,
    },
    ClearData {
        response: oneshot::Sender<Result<()>>,
    },
    AskRestoredTracks {
        response: oneshot::Sender<Result<HashMap<String, i64>>>,
    },
    Query(QueryFn),
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

pub struct LibraryWorker {
    thread: JoinHandle<()>,
}

impl LibraryWorker {
    /// Move `db` onto a new thread and return a handle to talk to it.
    ///
    /// `RequestsInitDone` is emitted once the thread is accepting commands.
    pub fn spawn(db: Database, events: EventBus, queue_size: usize) -> Result<(LibraryHandle, Self)> {
        let (command_tx, command_rx) = mpsc::channel(queue_size.max(1));

        let thread = std::thread::Builder::new()
            .name("rmstore-library".to_owned())
            .spawn(move || run(db, events, command_rx))?;

        Ok((LibraryHandle { command_tx }, Self { thread }))
    }

    /// Wait for the thread to exit. Call after [`LibraryHandle::shutdown`].
    pub fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| StoreError::WorkerStopped)
    }
}

fn run(mut db: Database, events: EventBus, mut commands: mpsc::Receiver<Command>) {
    info!("Library worker started");
    events.emit(LibraryEvent::RequestsInitDone);

    let mut changes = ChangeTracker::new();

    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::InsertTracks {
                tracks,
                covers,
                response,
            } => {
                let result = db.insert_tracks(&tracks, &covers, &mut changes);
                publish(&db, &events, &mut changes, &result);
                events.emit(LibraryEvent::InsertingTracksDone);
                let _ = response.send(result);
            }
            Command::RemoveTracks { uris, response } => {
                let result = db.remove_tracks_list(&uris, &mut changes);
                publish(&db, &events, &mut changes, &result);
                events.emit(LibraryEvent::RemovingTracksDone);
                let _ = response.send(result);
            }
            Command::TrackStartedPlaying {
                uri,
                timestamp,
                response,
            } => {
                let result = db.track_has_started_playing(&uri, timestamp, &mut changes);
                publish(&db, &events, &mut changes, &result);
                let _ = response.send(result);
            }
            Command::ClearData { response } => {
                let result = db.clear_data();
                match &result {
                    Ok(()) => events.emit(LibraryEvent::DatabaseCleaned),
                    Err(e) => {
                        error!("Failed to clear library store: {}", e);
                        events.emit(LibraryEvent::DatabaseError);
                    }
                }
                let _ = response.send(result);
            }
            Command::AskRestoredTracks { response } => {
                let result = db.ask_restored_tracks();
                match &result {
                    Ok(restored) => events.emit(LibraryEvent::RestoredTracks(restored.clone())),
                    Err(e) => {
                        error!("Failed to read track origins: {}", e);
                        events.emit(LibraryEvent::DatabaseError);
                    }
                }
                let _ = response.send(result);
            }
            Command::Query(query) => query(&db),
            Command::Shutdown { response } => {
                info!("Library worker stopping");
                let _ = response.send(());
                break;
            }
        }
    }

    debug!("Library worker exited");
}

fn publish(db: &Database, events: &EventBus, changes: &mut ChangeTracker, result: &Result<()>) {
    if let Err(e) = result {
        error!("Library write failed: {}", e);
        events.emit(LibraryEvent::DatabaseError);
        return;
    }

    match db.drain_changes(changes) {
        Ok(drained) => {
            for event in drained {
                events.emit(event);
            }
        }
        Err(e) => {
            error!("Failed to build change notifications: {}", e);
            events.emit(LibraryEvent::DatabaseError);
        }
    }
}

/// Cloneable handle to the library worker.
///
/// Every call is queued behind the ones before it. Events of a call are
/// on the bus before the call returns.
#[derive(Debug, Clone)]
pub struct LibraryHandle {
    command_tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::InsertTracks { .. } => "InsertTracks",
            Command::RemoveTracks { .. } => "RemoveTracks",
            Command::TrackStartedPlaying { .. } => "TrackStartedPlaying",
            Command::ClearData { .. } => "ClearData",
            Command::AskRestoredTracks { .. } => "AskRestoredTracks",
            Command::Query(_) => "Query",
            Command::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl LibraryHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|_| StoreError::WorkerStopped)?;

        response_rx.await.map_err(|_| StoreError::WorkerStopped)?
    }

    pub async fn insert_tracks(
        &self,
        tracks: Vec<TrackMetadata>,
        covers: HashMap<String, String>,
    ) -> Result<()> {
        self.request(|response| Command::InsertTracks {
            tracks,
            covers,
            response,
        })
        .await
    }

    pub async fn remove_tracks_list(&self, uris: Vec<String>) -> Result<()> {
        self.request(|response| Command::RemoveTracks { uris, response })
            .await
    }

    pub async fn track_has_started_playing(&self, uri: impl Into<String>, timestamp: i64) -> Result<()> {
        let uri = uri.into();
        self.request(|response| Command::TrackStartedPlaying {
            uri,
            timestamp,
            response,
        })
        .await
    }

    pub async fn clear_data(&self) -> Result<()> {
        self.request(|response| Command::ClearData { response }).await
    }

    pub async fn ask_restored_tracks(&self) -> Result<HashMap<String, i64>> {
        self.request(|response| Command::AskRestoredTracks { response })
            .await
    }

    /// Run a read query on the worker thread, between writes.
    pub async fn query<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.request(|response| {
            Command::Query(Box::new(move |db: &Database| {
                let _ = response.send(f(db));
            }))
        })
        .await
    }

    /// Ask the worker to exit after the command in progress. Commands
    /// still queued behind it fail with `WorkerStopped`.
    pub async fn shutdown(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();

        if self
            .command_tx
            .send(Command::Shutdown {
                response: response_tx,
            })
            .await
            .is_err()
        {
            debug!("Library worker already stopped");
            return Ok(());
        }

        let _ = response_rx.await;
        Ok(())
    }
}
