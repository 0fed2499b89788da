//! IndexListener: feeds catalog repo events into the index cache.
//!
//! A single task consumes the store's watch stream and applies repo events
//! strictly in arrival order. If the task falls behind the broadcast buffer
//! it rebuilds the cache from a full store listing instead of guessing which
//! events it missed.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use chartgrid_state::{CatalogStore, EventType, StoreObject, WatchEvent};

use crate::cache::IndexCache;

pub struct IndexListener<S> {
    cache: Arc<IndexCache>,
    store: S,
}

impl<S: CatalogStore> IndexListener<S> {
    pub fn new(cache: Arc<IndexCache>, store: S) -> Self {
        Self { cache, store }
    }

    /// Run until shutdown is signalled or the event stream closes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        // Subscribe before the initial listing so no change falls between.
        let mut events = self.store.watch();
        self.resync().await;
        info!("index listener started");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => self.handle(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "index listener lagged behind catalog events, resyncing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        info!("catalog event stream closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("index listener shutting down");
                    break;
                }
            }
        }
    }

    async fn resync(&self) {
        if let Err(e) = self.cache.resync(&self.store).await {
            error!(error = %e, kind = %e.kind(), "index resync failed");
        }
    }

    async fn handle(&self, event: WatchEvent) {
        let StoreObject::Repo(repo) = event.object else {
            // Only repos feed the index.
            return;
        };
        debug!(repo = %repo.id, event = ?event.event, "repo event");
        match event.event {
            EventType::Added => self.cache.on_repo_added(&repo).await,
            EventType::Updated => self.cache.on_repo_updated(&repo).await,
            EventType::Deleted => self.cache.on_repo_deleted(&repo).await,
        }
    }
}
