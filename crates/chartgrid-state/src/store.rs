//! StateStore: redb-backed catalog and blob persistence for Chartgrid.
//!
//! Provides generic CRUD over every [`Entity`] kind plus raw package blobs.
//! Entities are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tokio::sync::broadcast;
use tracing::debug;

use crate::catalog::{BlobKey, BlobStore, CatalogStore};
use crate::entity::{Entity, EventType, LabelSelector, WatchEvent};
use crate::error::{StateError, StateResult};
use crate::patch;
use crate::tables::*;

/// Default capacity of the watch channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    events: broadcast::Sender<WatchEvent>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path, event_buffer: usize) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db, event_buffer);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db, DEFAULT_EVENT_BUFFER);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            db: Arc::new(db),
            events,
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(REPOS).map_err(map_err!(Table))?;
        txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        txn.open_table(APP_VERSIONS).map_err(map_err!(Table))?;
        txn.open_table(RELEASES).map_err(map_err!(Table))?;
        txn.open_table(BLOBS).map_err(map_err!(Table))?;
        txn.open_table(UNIQUE_KEYS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn notify<T: Entity>(&self, event: EventType, obj: T) {
        // No subscribers is fine; watchers resync from a list when they attach.
        let _ = self.events.send(WatchEvent {
            event,
            object: obj.into_object(),
        });
    }

    /// Read the raw value stored under `key`.
    fn current_value(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<Option<Vec<u8>>> {
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec()))
    }
}

/// Move the unique-key claim of the record at `key` from `old` to `new`.
/// Fails with `AlreadyExists` when another record holds the new claim.
fn reindex_unique<T: Entity>(
    txn: &WriteTransaction,
    key: &str,
    old: Option<&T>,
    new: Option<&T>,
) -> StateResult<()> {
    let old_claim = old.and_then(T::unique_key);
    let new_claim = new.and_then(T::unique_key);
    if old_claim == new_claim {
        return Ok(());
    }

    let mut claims = txn.open_table(UNIQUE_KEYS).map_err(map_err!(Table))?;
    if let Some(claim) = &new_claim {
        let claim_key = format!("{}/{claim}", T::KIND.as_str());
        let taken = claims
            .get(claim_key.as_str())
            .map_err(map_err!(Read))?
            .is_some_and(|owner| owner.value() != key.as_bytes());
        if taken {
            return Err(StateError::AlreadyExists(format!("{} {claim}", T::KIND.as_str())));
        }
    }
    if let Some(claim) = &old_claim {
        let claim_key = format!("{}/{claim}", T::KIND.as_str());
        claims.remove(claim_key.as_str()).map_err(map_err!(Write))?;
    }
    if let Some(claim) = &new_claim {
        let claim_key = format!("{}/{claim}", T::KIND.as_str());
        claims
            .insert(claim_key.as_str(), key.as_bytes())
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

fn decode<T: Entity>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn encode<T: Entity>(obj: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(obj).map_err(map_err!(Serialize))
}

impl CatalogStore for StateStore {
    fn get<T: Entity>(&self, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(T::KIND.table()).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list<T: Entity>(&self, selector: &LabelSelector) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(T::KIND.table()).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let obj: T = decode(value.value())?;
            if selector.matches(obj.labels()) {
                results.push(obj);
            }
        }
        Ok(results)
    }

    fn create<T: Entity>(&self, obj: &T) -> StateResult<T> {
        let key = obj.store_key();
        let mut stored = obj.clone();
        stored.set_resource_version(1);
        let value = encode(&stored)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(T::KIND.table()).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!(
                    "{} {key}",
                    T::KIND.as_str()
                )));
            }
            reindex_unique(&txn, &key, None, Some(&stored))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND.as_str(), %key, "entity created");

        self.notify(EventType::Added, stored.clone());
        Ok(stored)
    }

    fn update<T: Entity>(&self, obj: &T) -> StateResult<T> {
        let key = obj.store_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(T::KIND.table()).map_err(map_err!(Table))?;
            let current: T = match Self::current_value(&table, &key)? {
                Some(bytes) => decode(&bytes)?,
                None => {
                    return Err(StateError::NotFound(format!("{} {key}", T::KIND.as_str())));
                }
            };
            if current.resource_version() != obj.resource_version() {
                return Err(StateError::Conflict {
                    key,
                    expected: obj.resource_version(),
                    actual: current.resource_version(),
                });
            }

            let mut stored = obj.clone();
            stored.set_resource_version(current.resource_version() + 1);
            reindex_unique(&txn, &key, Some(&current), Some(&stored))?;
            let value = encode(&stored)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND.as_str(), %key, rv = stored.resource_version(), "entity updated");

        self.notify(EventType::Updated, stored.clone());
        Ok(stored)
    }

    fn patch<T: Entity>(&self, base: &T, desired: &T) -> StateResult<T> {
        let key = base.store_key();
        let base_json = serde_json::to_value(base).map_err(map_err!(Serialize))?;
        let desired_json = serde_json::to_value(desired).map_err(map_err!(Serialize))?;
        let diff = patch::merge_diff(&base_json, &desired_json);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let (stored, changed) = {
            let mut table = txn.open_table(T::KIND.table()).map_err(map_err!(Table))?;
            let bytes = Self::current_value(&table, &key)?
                .ok_or_else(|| StateError::NotFound(format!("{} {key}", T::KIND.as_str())))?;
            let current: T = decode(&bytes)?;
            if current.resource_version() != base.resource_version() {
                return Err(StateError::Conflict {
                    key,
                    expected: base.resource_version(),
                    actual: current.resource_version(),
                });
            }
            if patch::is_empty(&diff) {
                (current, false)
            } else {
                let mut merged: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                patch::apply_merge(&mut merged, &diff);
                let mut stored: T =
                    serde_json::from_value(merged).map_err(map_err!(Deserialize))?;
                stored.set_resource_version(current.resource_version() + 1);
                reindex_unique(&txn, &key, Some(&current), Some(&stored))?;
                let value = encode(&stored)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                (stored, true)
            }
        };

        if !changed {
            // Nothing to write; the transaction is dropped uncommitted.
            debug!(kind = T::KIND.as_str(), %key, "empty patch skipped");
            return Ok(stored);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND.as_str(), %key, rv = stored.resource_version(), "entity patched");

        self.notify(EventType::Updated, stored.clone());
        Ok(stored)
    }

    fn delete<T: Entity>(&self, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed: Option<T> = {
            let mut table = txn.open_table(T::KIND.table()).map_err(map_err!(Table))?;
            let bytes = table
                .remove(key)
                .map_err(map_err!(Write))?
                .map(|guard| guard.value().to_vec());
            bytes.as_deref().map(decode).transpose()?
        };
        reindex_unique(&txn, key, removed.as_ref(), None)?;
        txn.commit().map_err(map_err!(Transaction))?;

        debug!(kind = T::KIND.as_str(), %key, existed = removed.is_some(), "entity deleted");
        if let Some(obj) = &removed {
            self.notify(EventType::Deleted, obj.clone());
        }
        Ok(removed)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

impl BlobStore for StateStore {
    fn put_blob(&self, key: &BlobKey, bytes: &[u8]) -> StateResult<()> {
        let key = key.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BLOBS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), bytes)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, size = bytes.len(), "blob stored");
        Ok(())
    }

    fn get_blob(&self, key: &BlobKey) -> StateResult<Option<Vec<u8>>> {
        let key = key.to_string();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BLOBS).map_err(map_err!(Table))?;
        Ok(table
            .get(key.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec()))
    }

    fn delete_blob(&self, key: &BlobKey) -> StateResult<bool> {
        let key = key.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(BLOBS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "blob deleted");
        Ok(existed)
    }
}
