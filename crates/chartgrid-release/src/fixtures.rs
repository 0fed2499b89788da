//! Shared test fixtures: repo `R` indexes application `A1` (wordpress) with
//! versions `V1` (5.0.0) and `V2` (5.1.0).

use std::sync::Arc;

use serde_json::json;

use chartgrid_core::{ApplicationVersion, LABEL_APP_ID, LABEL_REPO_ID, Repo};
use chartgrid_index::IndexCache;
use chartgrid_state::StateStore;

use crate::manager::{CreateReleaseRequest, ReleaseManager, UpgradeReleaseRequest};

pub const NS: &str = "default";
pub const BUILTIN: &str = "builtin-stable";

pub struct Fixture {
    pub store: StateStore,
    pub cache: Arc<IndexCache>,
    pub manager: ReleaseManager<StateStore>,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let cache = Arc::new(IndexCache::new());
        cache.on_repo_added(&repo()).await;
        let manager =
            ReleaseManager::new(store.clone(), cache.clone(), Arc::new(store.clone()), BUILTIN);
        Self {
            store,
            cache,
            manager,
        }
    }
}

pub fn repo() -> Repo {
    Repo {
        id: "R".to_string(),
        name: "bitnami".to_string(),
        workspace: "ws1".to_string(),
        url: "https://charts.example.com".to_string(),
        index_snapshot: json!({"applications": {"wordpress": {
            "metadata": {"id": "A1", "description": "blog engine"},
            "versions": [
                {"id": "V1", "version": "5.0.0", "created": 100,
                 "urls": ["https://charts.example.com/wordpress-5.0.0.tgz"]},
                {"id": "V2", "version": "5.1.0", "created": 200,
                 "urls": ["https://charts.example.com/wordpress-5.1.0.tgz"]}
            ]}}})
        .to_string(),
        ..Default::default()
    }
}

/// A version that lives only in the catalog store.
pub fn store_version(id: &str, repo_id: &str) -> ApplicationVersion {
    ApplicationVersion {
        id: id.to_string(),
        app_id: "A1".to_string(),
        repo_id: repo_id.to_string(),
        workspace: "ws1".to_string(),
        name: "wordpress".to_string(),
        version: "6.0.0".to_string(),
        labels: [
            (LABEL_APP_ID.to_string(), "A1".to_string()),
            (LABEL_REPO_ID.to_string(), repo_id.to_string()),
        ]
        .into(),
        ..Default::default()
    }
}

pub fn create_req(name: &str, version_id: &str) -> CreateReleaseRequest {
    CreateReleaseRequest {
        repo_id: "R".to_string(),
        app_id: "A1".to_string(),
        version_id: version_id.to_string(),
        name: name.to_string(),
        workspace: "ws1".to_string(),
        config_values: String::new(),
        operator: "alice".to_string(),
    }
}

pub fn upgrade_req(release_id: &str, version_id: &str) -> UpgradeReleaseRequest {
    UpgradeReleaseRequest {
        release_id: release_id.to_string(),
        namespace: NS.to_string(),
        version_id: version_id.to_string(),
        config_values: None,
        operator: "bob".to_string(),
    }
}
