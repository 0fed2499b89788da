//! Release manager: owns release records and resolves their versions.
//!
//! Versions are resolved through the index cache first. Versions of the
//! built-in store live in the catalog store and are read from there on a
//! cache miss; versions of any other repo are only known through the index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use chartgrid_core::{ApplicationVersion, Release, ReleaseStatus, epoch_secs};
use chartgrid_index::IndexCache;
use chartgrid_state::{BlobKey, BlobStore, CatalogStore, StateError};

use crate::error::{ReleaseError, ReleaseResult};
use crate::inspect::ReleaseInspector;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateReleaseRequest {
    /// Repo the version comes from; empty for the built-in store.
    #[serde(default)]
    pub repo_id: String,
    pub app_id: String,
    pub version_id: String,
    pub name: String,
    pub workspace: String,
    /// Values document handed to the installer.
    #[serde(default)]
    pub config_values: String,
    #[serde(default)]
    pub operator: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeReleaseRequest {
    pub release_id: String,
    pub namespace: String,
    pub version_id: String,
    /// Replacement values; `None` keeps the release's current values.
    #[serde(default)]
    pub config_values: Option<String>,
    #[serde(default)]
    pub operator: String,
}

/// Where the installer fetches a release's chart from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    /// Package bytes of a built-in store version.
    Package(Vec<u8>),
    /// Download locations of a repo version.
    Urls(Vec<String>),
}

pub struct ReleaseManager<S> {
    pub(crate) store: S,
    pub(crate) cache: Arc<IndexCache>,
    blobs: Arc<dyn BlobStore>,
    pub(crate) inspector: Option<Arc<dyn ReleaseInspector>>,
    builtin_repo_id: String,
}

impl<S: CatalogStore> ReleaseManager<S> {
    pub fn new(
        store: S,
        cache: Arc<IndexCache>,
        blobs: Arc<dyn BlobStore>,
        builtin_repo_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            blobs,
            inspector: None,
            builtin_repo_id: builtin_repo_id.into(),
        }
    }

    /// Attach the installer used to render live manifests.
    pub fn with_inspector(mut self, inspector: Arc<dyn ReleaseInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    fn is_builtin(&self, repo_id: &str) -> bool {
        repo_id.is_empty() || repo_id == self.builtin_repo_id
    }

    /// Built-in versions install from their uploaded package, which must
    /// be present before a release may point at them.
    fn ensure_package(&self, version: &ApplicationVersion) -> ReleaseResult<()> {
        if !self.is_builtin(&version.repo_id) {
            return Ok(());
        }
        let key = BlobKey::new(&version.workspace, &version.id);
        if self.blobs.get_blob(&key)?.is_none() {
            return Err(ReleaseError::PackageNotFound(version.id.clone()));
        }
        Ok(())
    }

    /// Resolve a version for a release.
    ///
    /// Cache first. On a miss, only built-in store versions (empty repo id
    /// or the built-in repo id) fall back to the catalog store.
    pub async fn get_app_version(
        &self,
        repo_id: &str,
        version_id: &str,
    ) -> ReleaseResult<ApplicationVersion> {
        if let Some(version) = self.cache.get_application_version(version_id).await {
            return Ok(version);
        }
        if !self.is_builtin(repo_id) {
            debug!(repo = %repo_id, version = %version_id, "repo version not indexed");
            return Err(ReleaseError::VersionNotFound(version_id.to_string()));
        }
        self.store
            .get(version_id)?
            .ok_or_else(|| ReleaseError::VersionNotFound(version_id.to_string()))
    }

    pub fn get_release(&self, namespace: &str, id: &str) -> ReleaseResult<Release> {
        self.store
            .get(&Release::key_for(namespace, id))?
            .ok_or_else(|| ReleaseError::ReleaseNotFound {
                namespace: namespace.to_string(),
                id: id.to_string(),
            })
    }

    /// Create a release at revision 1 in `Pending` state.
    pub async fn create_release(
        &self,
        namespace: &str,
        req: CreateReleaseRequest,
    ) -> ReleaseResult<Release> {
        if namespace.is_empty() {
            return Err(ReleaseError::InvalidRequest("namespace is required".into()));
        }
        if req.name.is_empty() {
            return Err(ReleaseError::InvalidRequest("release name is required".into()));
        }

        let version = self.get_app_version(&req.repo_id, &req.version_id).await?;
        if !req.app_id.is_empty() && version.app_id != req.app_id {
            return Err(ReleaseError::InvalidRequest(format!(
                "version {} does not belong to application {}",
                version.id, req.app_id
            )));
        }
        self.ensure_package(&version)?;

        let now = epoch_secs();
        let mut release = Release {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            workspace: req.workspace,
            namespace: namespace.to_string(),
            app_id: version.app_id.clone(),
            repo_id: version.repo_id.clone(),
            version_id: version.id.clone(),
            chart: version.chart_ref(),
            config_values: req.config_values,
            revision: 1,
            status: ReleaseStatus::Pending,
            message: String::new(),
            owner: req.operator,
            created_at: now,
            updated_at: now,
            labels: Default::default(),
            resource_version: 0,
        };
        release.labels = release.selector_labels();

        // The store claims `{namespace}/{name}` in the same transaction as
        // the record, so concurrent creates of one name succeed at most once.
        let created = match self.store.create(&release) {
            Ok(created) => created,
            Err(StateError::AlreadyExists(_)) => {
                return Err(ReleaseError::NameTaken {
                    namespace: namespace.to_string(),
                    name: release.name,
                });
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            release_id = %created.id,
            name = %created.name,
            %namespace,
            version = %created.version_id,
            owner = %created.owner,
            "release created"
        );
        Ok(created)
    }

    /// Move an active release to another version of its application.
    ///
    /// The release must be `Active`; anything else fails before the store
    /// is written. The new record is written as a patch against the loaded
    /// one, so a concurrent change surfaces as a conflict.
    pub async fn upgrade_release(&self, req: UpgradeReleaseRequest) -> ReleaseResult<Release> {
        let current = self.get_release(&req.namespace, &req.release_id)?;
        if current.status != ReleaseStatus::Active {
            return Err(ReleaseError::NotActive {
                id: current.id,
                status: current.status,
            });
        }

        let version = self
            .get_app_version(&current.repo_id, &req.version_id)
            .await?;
        if version.app_id != current.app_id {
            return Err(ReleaseError::InvalidRequest(format!(
                "version {} does not belong to application {}",
                version.id, current.app_id
            )));
        }
        self.ensure_package(&version)?;

        let mut desired = current.clone();
        desired.revision += 1;
        desired.repo_id = version.repo_id.clone();
        desired.version_id = version.id.clone();
        desired.chart = version.chart_ref();
        if let Some(values) = req.config_values {
            desired.config_values = values;
        }
        desired.status = ReleaseStatus::Upgrading;
        desired.message = String::new();
        desired.updated_at = epoch_secs();
        desired.labels = desired.selector_labels();

        let upgraded = self.store.patch(&current, &desired)?;
        info!(
            release_id = %upgraded.id,
            revision = upgraded.revision,
            from = %current.version_id,
            to = %upgraded.version_id,
            operator = %req.operator,
            "release upgraded"
        );
        Ok(upgraded)
    }

    /// Record the installer's outcome for a release.
    pub fn set_status(
        &self,
        namespace: &str,
        id: &str,
        status: ReleaseStatus,
        message: &str,
    ) -> ReleaseResult<Release> {
        let current = self.get_release(namespace, id)?;
        let mut desired = current.clone();
        desired.status = status;
        desired.message = message.to_string();
        desired.updated_at = epoch_secs();

        let saved = self.store.patch(&current, &desired)?;
        info!(release_id = %id, %namespace, from = %current.status, to = %status, "release status changed");
        Ok(saved)
    }

    /// Remove a release record. Uninstalling its workloads is left to the
    /// installer watching for the deletion.
    pub fn delete_release(&self, namespace: &str, id: &str) -> ReleaseResult<Release> {
        let removed: Release = self
            .store
            .delete(&Release::key_for(namespace, id))?
            .ok_or_else(|| ReleaseError::ReleaseNotFound {
                namespace: namespace.to_string(),
                id: id.to_string(),
            })?;
        info!(release_id = %id, %namespace, name = %removed.name, "release deleted");
        Ok(removed)
    }

    /// Locate the chart a release installs.
    pub async fn chart_source(&self, namespace: &str, id: &str) -> ReleaseResult<ChartSource> {
        let release = self.get_release(namespace, id)?;
        let version = self
            .get_app_version(&release.repo_id, &release.version_id)
            .await?;
        if !self.is_builtin(&version.repo_id) {
            return Ok(ChartSource::Urls(version.urls));
        }
        self.blobs
            .get_blob(&BlobKey::new(&version.workspace, &version.id))?
            .map(ChartSource::Package)
            .ok_or(ReleaseError::PackageNotFound(version.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use chartgrid_core::{ErrorKind, LABEL_VERSION_ID};

    #[tokio::test]
    async fn create_release_starts_pending_at_revision_one() {
        let f = Fixture::new().await;

        let release = f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();
        assert_eq!(release.revision, 1);
        assert_eq!(release.status, ReleaseStatus::Pending);
        assert_eq!(release.app_id, "A1");
        assert_eq!(release.repo_id, "R");
        assert_eq!(release.chart.name, "wordpress");
        assert_eq!(release.chart.version, "5.0.0");
        assert_eq!(release.owner, "alice");
        assert_eq!(release.labels.get(LABEL_VERSION_ID).map(String::as_str), Some("V1"));
        assert!(Uuid::parse_str(&release.id).is_ok());

        let stored = f.manager.get_release(NS, &release.id).unwrap();
        assert_eq!(stored, release);
    }

    #[tokio::test]
    async fn release_names_are_unique_per_namespace() {
        let f = Fixture::new().await;
        f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();

        let err = f
            .manager
            .create_release(NS, create_req("my-wp", "V2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // Same name in another namespace is fine.
        assert!(f.manager.create_release("staging", create_req("my-wp", "V1")).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_claim_a_name_once() {
        let f = Arc::new(Fixture::new().await);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                tokio::spawn(async move {
                    f.manager.create_release(NS, create_req("my-wp", "V1")).await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, ReleaseError::NameTaken { .. }), "{e}"),
            }
        }
        assert_eq!(created, 1);

        let stored: Vec<Release> = f.store.list(&chartgrid_state::LabelSelector::new()).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn create_requires_name_and_namespace() {
        let f = Fixture::new().await;
        let err = f.manager.create_release("", create_req("my-wp", "V1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = f.manager.create_release(NS, create_req("", "V1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn create_rejects_version_of_another_application() {
        let f = Fixture::new().await;
        let mut req = create_req("my-wp", "V1");
        req.app_id = "other".to_string();
        let err = f.manager.create_release(NS, req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn indexed_versions_never_fall_back_to_the_store() {
        let f = Fixture::new().await;
        // A stray stored copy under a non-built-in repo must stay invisible.
        f.store.create(&store_version("ghost", "R")).unwrap();

        let err = f.manager.get_app_version("R", "ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn builtin_versions_fall_back_to_the_store() {
        let f = Fixture::new().await;
        let stored = f.store.create(&store_version("B1", BUILTIN)).unwrap();

        let by_builtin = f.manager.get_app_version(BUILTIN, "B1").await.unwrap();
        let by_empty = f.manager.get_app_version("", "B1").await.unwrap();
        assert_eq!(by_builtin, stored);
        assert_eq!(by_empty, stored);

        let err = f.manager.get_app_version("", "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn builtin_release_requires_package() {
        let f = Fixture::new().await;
        f.store.create(&store_version("B1", BUILTIN)).unwrap();
        let mut req = create_req("blog", "B1");
        req.repo_id = BUILTIN.to_string();

        let err = f.manager.create_release(NS, req.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        f.store.put_blob(&BlobKey::new("ws1", "B1"), b"chart").unwrap();
        let release = f.manager.create_release(NS, req).await.unwrap();
        assert_eq!(
            f.manager.chart_source(NS, &release.id).await.unwrap(),
            ChartSource::Package(b"chart".to_vec())
        );
    }

    #[tokio::test]
    async fn builtin_upgrade_requires_package() {
        let f = Fixture::new().await;
        f.store.create(&store_version("B1", BUILTIN)).unwrap();
        f.store.put_blob(&BlobKey::new("ws1", "B1"), b"chart").unwrap();
        let mut req = create_req("blog", "B1");
        req.repo_id = BUILTIN.to_string();
        let release = f.manager.create_release(NS, req).await.unwrap();
        let active = f.manager.set_status(NS, &release.id, ReleaseStatus::Active, "").unwrap();

        let mut unpackaged = store_version("B2", BUILTIN);
        unpackaged.version = "6.1.0".to_string();
        f.store.create(&unpackaged).unwrap();

        let err = f.manager.upgrade_release(upgrade_req(&release.id, "B2")).await.unwrap_err();
        assert!(matches!(err, ReleaseError::PackageNotFound(ref id) if id == "B2"));
        assert_eq!(f.manager.get_release(NS, &release.id).unwrap(), active);

        f.store.put_blob(&BlobKey::new("ws1", "B2"), b"chart-2").unwrap();
        let upgraded = f.manager.upgrade_release(upgrade_req(&release.id, "B2")).await.unwrap();
        assert_eq!(upgraded.revision, 2);
        assert_eq!(
            f.manager.chart_source(NS, &release.id).await.unwrap(),
            ChartSource::Package(b"chart-2".to_vec())
        );
    }

    #[tokio::test]
    async fn repo_release_sources_chart_from_urls() {
        let f = Fixture::new().await;
        let release = f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();

        let source = f.manager.chart_source(NS, &release.id).await.unwrap();
        assert_eq!(
            source,
            ChartSource::Urls(vec!["https://charts.example.com/wordpress-5.0.0.tgz".into()])
        );
    }

    #[tokio::test]
    async fn upgrade_requires_active_and_leaves_store_untouched() {
        let f = Fixture::new().await;
        let release = f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();

        let err = f.manager.upgrade_release(upgrade_req(&release.id, "V2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let stored = f.manager.get_release(NS, &release.id).unwrap();
        assert_eq!(stored, release);
    }

    #[tokio::test]
    async fn upgrade_bumps_revision_and_replaces_chart() {
        let f = Fixture::new().await;
        let mut req = create_req("my-wp", "V1");
        req.config_values = "replicas: 1".to_string();
        let release = f.manager.create_release(NS, req).await.unwrap();
        f.manager.set_status(NS, &release.id, ReleaseStatus::Active, "installed").unwrap();

        let upgraded = f.manager.upgrade_release(upgrade_req(&release.id, "V2")).await.unwrap();
        assert_eq!(upgraded.revision, 2);
        assert_eq!(upgraded.version_id, "V2");
        assert_eq!(upgraded.chart.version, "5.1.0");
        assert_eq!(upgraded.status, ReleaseStatus::Upgrading);
        assert_eq!(upgraded.config_values, "replicas: 1");
        assert_eq!(upgraded.labels.get(LABEL_VERSION_ID).map(String::as_str), Some("V2"));
        assert_eq!(upgraded.created_at, release.created_at);
    }

    #[tokio::test]
    async fn upgrade_replaces_values_when_supplied() {
        let f = Fixture::new().await;
        let release = f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();
        f.manager.set_status(NS, &release.id, ReleaseStatus::Active, "").unwrap();

        let mut req = upgrade_req(&release.id, "V2");
        req.config_values = Some("replicas: 3".to_string());
        let upgraded = f.manager.upgrade_release(req).await.unwrap();
        assert_eq!(upgraded.config_values, "replicas: 3");
    }

    #[tokio::test]
    async fn upgrade_of_missing_release_is_not_found() {
        let f = Fixture::new().await;
        let err = f.manager.upgrade_release(upgrade_req("nope", "V2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stale_patch_surfaces_conflict() {
        let f = Fixture::new().await;
        let release = f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();
        f.manager.set_status(NS, &release.id, ReleaseStatus::Active, "").unwrap();

        // A writer holding the pre-activation copy loses.
        let mut stale = release.clone();
        stale.message = "late".to_string();
        let err = f.store.patch(&release, &stale).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn delete_release_is_terminal() {
        let f = Fixture::new().await;
        let release = f.manager.create_release(NS, create_req("my-wp", "V1")).await.unwrap();

        let removed = f.manager.delete_release(NS, &release.id).unwrap();
        assert_eq!(removed.id, release.id);

        let err = f.manager.delete_release(NS, &release.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // The name is free again.
        assert!(f.manager.create_release(NS, create_req("my-wp", "V1")).await.is_ok());
    }
}
