//! Entity plumbing shared by every catalog table.
//!
//! [`Entity`] ties a core type to its table, key, labels, and resource
//! version so the store's CRUD paths are written once. Watch events carry a
//! closed [`StoreObject`] enum.

use std::collections::BTreeMap;

use redb::TableDefinition;
use serde::Serialize;
use serde::de::DeserializeOwned;

use chartgrid_core::{Application, ApplicationVersion, Release, Repo};

use crate::tables::*;

static NO_LABELS: BTreeMap<String, String> = BTreeMap::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Repo,
    Application,
    ApplicationVersion,
    Release,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Repo => "repo",
            EntityKind::Application => "application",
            EntityKind::ApplicationVersion => "application_version",
            EntityKind::Release => "release",
        }
    }

    pub(crate) fn table(&self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            EntityKind::Repo => REPOS,
            EntityKind::Application => APPLICATIONS,
            EntityKind::ApplicationVersion => APP_VERSIONS,
            EntityKind::Release => RELEASES,
        }
    }
}

/// A record the catalog store can persist.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Primary key inside the entity's table.
    fn store_key(&self) -> String;

    /// Secondary key that must be unique among entities of this kind. The
    /// store claims it in the same transaction as the record itself.
    fn unique_key(&self) -> Option<String> {
        None
    }

    fn labels(&self) -> &BTreeMap<String, String>;

    fn resource_version(&self) -> u64;

    fn set_resource_version(&mut self, version: u64);

    fn into_object(self) -> StoreObject;
}

impl Entity for Repo {
    const KIND: EntityKind = EntityKind::Repo;

    fn store_key(&self) -> String {
        self.id.clone()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &NO_LABELS
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }

    fn into_object(self) -> StoreObject {
        StoreObject::Repo(self)
    }
}

impl Entity for Application {
    const KIND: EntityKind = EntityKind::Application;

    fn store_key(&self) -> String {
        self.id.clone()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }

    fn into_object(self) -> StoreObject {
        StoreObject::Application(self)
    }
}

impl Entity for ApplicationVersion {
    const KIND: EntityKind = EntityKind::ApplicationVersion;

    fn store_key(&self) -> String {
        self.id.clone()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }

    fn into_object(self) -> StoreObject {
        StoreObject::ApplicationVersion(self)
    }
}

impl Entity for Release {
    const KIND: EntityKind = EntityKind::Release;

    fn store_key(&self) -> String {
        self.table_key()
    }

    /// Release names are unique per namespace.
    fn unique_key(&self) -> Option<String> {
        Some(Release::key_for(&self.namespace, &self.name))
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }

    fn into_object(self) -> StoreObject {
        StoreObject::Release(self)
    }
}

/// Any persisted catalog object.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreObject {
    Repo(Repo),
    Application(Application),
    ApplicationVersion(ApplicationVersion),
    Release(Release),
}

impl StoreObject {
    pub fn kind(&self) -> EntityKind {
        match self {
            StoreObject::Repo(_) => EntityKind::Repo,
            StoreObject::Application(_) => EntityKind::Application,
            StoreObject::ApplicationVersion(_) => EntityKind::ApplicationVersion,
            StoreObject::Release(_) => EntityKind::Release,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Updated,
    Deleted,
}

/// A committed change, as seen by watchers.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub event: EventType,
    pub object: StoreObject,
}

/// Equality-based label selector. An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key == value`.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.requirements.insert(key.to_string(), value.to_string());
        self
    }

    /// Require `key == value` unless `value` is empty.
    pub fn with_nonempty(self, key: &str, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.with(key, value)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}
