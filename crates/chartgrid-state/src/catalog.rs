//! Store boundaries consumed by the rest of Chartgrid.

use std::fmt;

use tokio::sync::broadcast;

use crate::entity::{Entity, LabelSelector, WatchEvent};
use crate::error::StateResult;

/// Authoritative persistent store of catalog entities.
pub trait CatalogStore: Clone + Send + Sync + 'static {
    /// Fetch one entity by its store key.
    fn get<T: Entity>(&self, key: &str) -> StateResult<Option<T>>;

    /// List every entity of a kind whose labels match the selector.
    fn list<T: Entity>(&self, selector: &LabelSelector) -> StateResult<Vec<T>>;

    /// Insert a new entity. Fails with `AlreadyExists` if the key is taken.
    fn create<T: Entity>(&self, obj: &T) -> StateResult<T>;

    /// Replace an entity. The caller's resource version must match the stored one.
    fn update<T: Entity>(&self, obj: &T) -> StateResult<T>;

    /// Write the difference between `base` and `desired`. Fails with
    /// `Conflict` if the stored entity moved past `base`.
    fn patch<T: Entity>(&self, base: &T, desired: &T) -> StateResult<T>;

    /// Remove an entity, returning it if it existed.
    fn delete<T: Entity>(&self, key: &str) -> StateResult<Option<T>>;

    /// Subscribe to committed changes of every kind.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Key of a chart package payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub workspace: String,
    pub version_id: String,
}

impl BlobKey {
    pub fn new(workspace: &str, version_id: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            version_id: version_id.to_string(),
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.version_id)
    }
}

/// Byte storage for chart packages.
pub trait BlobStore: Send + Sync {
    fn put_blob(&self, key: &BlobKey, bytes: &[u8]) -> StateResult<()>;

    fn get_blob(&self, key: &BlobKey) -> StateResult<Option<Vec<u8>>>;

    /// Returns true if the blob existed.
    fn delete_blob(&self, key: &BlobKey) -> StateResult<bool>;
}
