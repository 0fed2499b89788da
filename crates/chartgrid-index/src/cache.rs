//! IndexCache: applications and versions projected from repo snapshots.
//!
//! All maps sit behind one `RwLock`. Repo events replace a repo's whole
//! contribution under a single write lock; lookups hold the read lock only
//! for one map access and hand back clones, so no lock is ever held across a
//! store call.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use chartgrid_core::*;
use chartgrid_state::{CatalogStore, LabelSelector, StateResult};

/// Entry counts, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub repos: usize,
    pub applications: usize,
    pub versions: usize,
}

#[derive(Default)]
struct CacheState {
    repos: HashMap<RepoId, Repo>,
    applications: HashMap<ApplicationId, Application>,
    versions: HashMap<VersionId, ApplicationVersion>,
    /// application id → its version ids.
    app_versions: HashMap<ApplicationId, BTreeSet<VersionId>>,
    /// repo id → application ids it contributed.
    repo_apps: HashMap<RepoId, BTreeSet<ApplicationId>>,
}

impl CacheState {
    /// Drop an application and every version under it, provided the
    /// application was contributed by `repo_id`.
    fn remove_application(&mut self, repo_id: &str, app_id: &str) {
        let owned = self
            .applications
            .get(app_id)
            .is_some_and(|app| app.repo_id == repo_id);
        if !owned {
            return;
        }
        self.applications.remove(app_id);
        if let Some(version_ids) = self.app_versions.remove(app_id) {
            for id in version_ids {
                self.versions.remove(&id);
            }
        }
    }

    fn remove_contribution(&mut self, repo_id: &str, extra_apps: &HashSet<String>) {
        let mut app_ids = self.repo_apps.remove(repo_id).unwrap_or_default();
        app_ids.extend(extra_apps.iter().cloned());
        for app_id in &app_ids {
            self.remove_application(repo_id, app_id);
        }
    }

    /// Insert a repo's projection. Must follow `remove_contribution` for the
    /// same repo, so any id still present belongs to another repo; those
    /// entries keep their first owner and the newcomer is skipped.
    fn insert_projection(&mut self, projection: RepoProjection) {
        let repo_id = projection.repo_id;
        let mut app_ids = BTreeSet::new();
        for projected in projection.applications {
            let app_id = projected.application.id.clone();
            if let Some(owner) = self.applications.get(&app_id) {
                warn!(
                    repo = %repo_id,
                    app = %app_id,
                    owner = %owner.repo_id,
                    "application id already indexed from another repo, skipping"
                );
                continue;
            }
            let mut version_ids = BTreeSet::new();
            for version in projected.versions {
                if let Some(owner) = self.versions.get(&version.id) {
                    warn!(
                        repo = %repo_id,
                        version = %version.id,
                        owner = %owner.repo_id,
                        "version id already indexed from another repo, skipping"
                    );
                    continue;
                }
                version_ids.insert(version.id.clone());
                self.versions.insert(version.id.clone(), version);
            }
            self.app_versions.insert(app_id.clone(), version_ids);
            self.applications.insert(app_id.clone(), projected.application);
            app_ids.insert(app_id);
        }
        self.repo_apps.insert(repo_id, app_ids);
    }
}

/// In-memory index of every repo's applications and versions.
#[derive(Default)]
pub struct IndexCache {
    state: RwLock<CacheState>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Repo events ────────────────────────────────────────────────

    /// Index a newly registered repo.
    pub async fn on_repo_added(&self, repo: &Repo) {
        self.replace_contribution(repo, "added").await;
    }

    /// Re-index a repo whose snapshot (or metadata) changed.
    pub async fn on_repo_updated(&self, repo: &Repo) {
        self.replace_contribution(repo, "updated").await;
    }

    /// Forget a repo and everything it contributed.
    pub async fn on_repo_deleted(&self, repo: &Repo) {
        // The delete event carries the last-known snapshot; decode it so ids
        // that never made it into the repo index are removed too.
        let from_snapshot: HashSet<String> = match RepoProjection::from_repo(repo) {
            Ok(projection) => projection.application_ids().map(str::to_string).collect(),
            Err(e) => {
                warn!(repo = %repo.id, error = %e, "undecodable snapshot on delete, using repo index only");
                HashSet::new()
            }
        };

        let mut state = self.state.write().await;
        state.remove_contribution(&repo.id, &from_snapshot);
        state.repos.remove(&repo.id);
        info!(repo = %repo.id, "repo removed from index");
    }

    async fn replace_contribution(&self, repo: &Repo, reason: &'static str) {
        // Decode outside the lock; a bad snapshot leaves the previous
        // contribution in place.
        let projection = match RepoProjection::from_repo(repo) {
            Ok(projection) => projection,
            Err(e) => {
                warn!(repo = %repo.id, error = %e, "skipping undecodable index snapshot");
                return;
            }
        };
        let applications = projection.applications.len();
        let versions: usize = projection.applications.iter().map(|p| p.versions.len()).sum();

        let mut state = self.state.write().await;
        state.remove_contribution(&repo.id, &HashSet::new());
        state.insert_projection(projection);
        state.repos.insert(repo.id.clone(), repo.clone());
        drop(state);

        info!(repo = %repo.id, reason, applications, versions, "repo indexed");
    }

    /// Rebuild from the store: index every stored repo and drop repos that
    /// no longer exist. Returns the number of repos indexed.
    pub async fn resync<S: CatalogStore>(&self, store: &S) -> StateResult<usize> {
        let repos: Vec<Repo> = store.list(&LabelSelector::new())?;
        let live: HashSet<&str> = repos.iter().map(|r| r.id.as_str()).collect();

        let stale: Vec<Repo> = {
            let state = self.state.read().await;
            state
                .repos
                .values()
                .filter(|r| !live.contains(r.id.as_str()))
                .cloned()
                .collect()
        };
        for repo in &stale {
            self.on_repo_deleted(repo).await;
        }
        for repo in &repos {
            self.on_repo_added(repo).await;
        }

        debug!(repos = repos.len(), removed = stale.len(), "index resynced");
        Ok(repos.len())
    }

    // ── Lookups ────────────────────────────────────────────────────

    pub async fn get_repo(&self, id: &str) -> Option<Repo> {
        self.state.read().await.repos.get(id).cloned()
    }

    pub async fn get_application(&self, id: &str) -> Option<Application> {
        self.state.read().await.applications.get(id).cloned()
    }

    pub async fn get_application_version(&self, id: &str) -> Option<ApplicationVersion> {
        self.state.read().await.versions.get(id).cloned()
    }

    /// Versions of an application ordered by semantic version ascending,
    /// creation time as tie-break. `None` if the application is not cached.
    pub async fn list_application_versions(
        &self,
        app_id: &str,
    ) -> Option<Vec<ApplicationVersion>> {
        let mut versions: Vec<ApplicationVersion> = {
            let state = self.state.read().await;
            let ids = state.app_versions.get(app_id)?;
            ids.iter()
                .filter_map(|id| state.versions.get(id).cloned())
                .collect()
        };
        sort_versions(&mut versions);
        Some(versions)
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            repos: state.repos.len(),
            applications: state.applications.len(),
            versions: state.versions.len(),
        }
    }
}
