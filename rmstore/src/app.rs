use anyhow::Result;
use rmstore_core::config::Config;
use rmstore_core::event::{EventBus, LibraryEvent};
use rmstore_library::{Database, LibraryWorker, StoreOptions};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

pub async fn run(config: Config, reset: bool) -> Result<()> {
    let mut db = Database::open(&config.general.db_file, StoreOptions::from(&config.store))?;

    if reset {
        info!("Reset requested, clearing store");
        db.clear_data()?;
    }

    info!(
        "Store holds {} tracks, {} albums, {} artists",
        db.count_tracks()?,
        db.count_albums()?,
        db.count_artists()?
    );

    let events = EventBus::with_capacity(config.store.event_channel_capacity);
    let log_task = tokio::spawn(log_events(events.subscribe()));

    let (handle, worker) = LibraryWorker::spawn(db, events, config.store.worker_queue_size)?;

    let restored = handle.ask_restored_tracks().await?;
    info!("{} known files", restored.len());

    match signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    handle.shutdown().await?;
    // Blocks until the command in progress has committed or rolled back
    tokio::task::spawn_blocking(move || worker.join()).await??;

    log_task.abort();
    info!("Library store closed");
    Ok(())
}

async fn log_events(mut rx: broadcast::Receiver<LibraryEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event log fell behind, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &LibraryEvent) {
    match event {
        LibraryEvent::DatabaseError => warn!("Library reported a database error"),
        LibraryEvent::RequestsInitDone => info!("Library worker ready"),
        LibraryEvent::RestoredTracks(restored) => {
            debug!("Restored {} track origins", restored.len());
        }
        other => debug!("{:?} event: {:?}", other.subsystem(), other),
    }
}
