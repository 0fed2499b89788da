//! Versions created from uploaded chart packages.
//!
//! The package bytes go to the blob store under the version's key before the
//! version record is created; if the record cannot be created the blob is
//! removed again.

use tracing::{info, warn};

use chartgrid_core::snapshot::derive_id;
use chartgrid_core::{
    Application, ApplicationVersion, AuditEntry, ChartParser, LABEL_APP_ID, LABEL_REPO_ID,
    LABEL_WORKSPACE, VersionState, epoch_secs,
};
use chartgrid_state::{BlobKey, BlobStore, CatalogStore, StateError};

use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::Lifecycle;

/// A chart package uploaded for an existing application.
#[derive(Debug, Clone, Default)]
pub struct CreateVersionRequest {
    pub app_id: String,
    /// Workspace the package is stored under.
    pub workspace: String,
    /// Gzipped chart archive.
    pub package: Vec<u8>,
    pub operator: String,
    pub message: String,
}

impl<S: CatalogStore> Lifecycle<S> {
    /// Create a draft version from an uploaded package.
    pub fn create_version(&self, req: CreateVersionRequest) -> LifecycleResult<ApplicationVersion> {
        let chart = self.parser.parse(&req.package)?;
        let app: Application = self
            .store
            .get(&req.app_id)?
            .ok_or_else(|| LifecycleError::ApplicationNotFound(req.app_id.clone()))?;

        let now = epoch_secs();
        let id = derive_id("appv", &[app.id.as_str(), chart.version.as_str()]);
        let version = ApplicationVersion {
            id: id.clone(),
            app_id: app.id.clone(),
            repo_id: self.settings.builtin_repo_id.clone(),
            workspace: req.workspace.clone(),
            name: chart.name,
            version: chart.version,
            app_version: chart.app_version,
            description: chart.description,
            home: chart.home,
            icon: chart.icon,
            urls: Vec::new(),
            digest: String::new(),
            created_at: now,
            audit: vec![AuditEntry {
                state: VersionState::Draft,
                operator: req.operator,
                message: req.message,
                time: now,
            }],
            labels: [
                (LABEL_APP_ID.to_string(), app.id.clone()),
                (LABEL_REPO_ID.to_string(), self.settings.builtin_repo_id.clone()),
                (LABEL_WORKSPACE.to_string(), req.workspace.clone()),
            ]
            .into(),
            resource_version: 0,
        };

        // Checked before the blob write so a duplicate cannot clobber the
        // existing package; the create below still catches racing uploads.
        if self.store.get::<ApplicationVersion>(&id)?.is_some() {
            return Err(StateError::AlreadyExists(id).into());
        }

        let key = BlobKey::new(&req.workspace, &id);
        self.blobs.put_blob(&key, &req.package)?;
        match self.store.create(&version) {
            Ok(created) => {
                info!(
                    version = %id,
                    app = %created.app_id,
                    chart = %created.name,
                    chart_version = %created.version,
                    bytes = req.package.len(),
                    "created version from package"
                );
                Ok(created)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete_blob(&key) {
                    warn!(blob = %key, error = %cleanup, "failed to remove orphaned package");
                }
                Err(e.into())
            }
        }
    }

    /// Delete a stored version and its package.
    pub fn delete_version(&self, version_id: &str) -> LifecycleResult<ApplicationVersion> {
        let removed: ApplicationVersion = self
            .store
            .delete(version_id)?
            .ok_or_else(|| LifecycleError::VersionNotFound(version_id.to_string()))?;
        let had_package = self
            .blobs
            .delete_blob(&BlobKey::new(&removed.workspace, version_id))?;
        info!(version = %version_id, had_package, "deleted version");
        Ok(removed)
    }

    /// Fetch the uploaded package of a stored version.
    pub fn load_package(&self, version_id: &str) -> LifecycleResult<Vec<u8>> {
        let version: ApplicationVersion = self
            .store
            .get(version_id)?
            .ok_or_else(|| LifecycleError::VersionNotFound(version_id.to_string()))?;
        self.blobs
            .get_blob(&BlobKey::new(&version.workspace, version_id))?
            .ok_or_else(|| LifecycleError::PackageNotFound(version_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use chartgrid_core::{ErrorKind, TarballChartParser};
    use chartgrid_index::IndexCache;
    use chartgrid_state::StateStore;

    use super::*;
    use crate::machine::LifecycleSettings;

    fn package(chart_yaml: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(chart_yaml.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "wordpress/Chart.yaml", chart_yaml.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn setup() -> (StateStore, Lifecycle<StateStore>) {
        let store = StateStore::open_in_memory().unwrap();
        store
            .create(&Application {
                id: "A".to_string(),
                name: "wordpress".to_string(),
                ..Default::default()
            })
            .unwrap();
        let lc = Lifecycle::new(
            store.clone(),
            Arc::new(IndexCache::new()),
            Arc::new(store.clone()),
            Arc::new(TarballChartParser),
            LifecycleSettings::default(),
        );
        (store, lc)
    }

    fn request(package: Vec<u8>) -> CreateVersionRequest {
        CreateVersionRequest {
            app_id: "A".to_string(),
            workspace: "ws1".to_string(),
            package,
            operator: "alice".to_string(),
            message: "first upload".to_string(),
        }
    }

    const CHART: &str = "name: wordpress\nversion: 1.2.3\nappVersion: \"6.4\"\ndescription: blog\n";

    #[test]
    fn upload_creates_draft_version_and_stores_package() {
        let (store, lc) = setup();
        let bytes = package(CHART);

        let version = lc.create_version(request(bytes.clone())).unwrap();
        assert_eq!(version.state(), VersionState::Draft);
        assert_eq!(version.version, "1.2.3");
        assert_eq!(version.app_version, "6.4");
        assert_eq!(version.repo_id, "builtin-stable");
        assert_eq!(version.audit[0].operator, "alice");

        let stored: ApplicationVersion = store.get(&version.id).unwrap().unwrap();
        assert_eq!(stored.labels.get(LABEL_APP_ID).map(String::as_str), Some("A"));
        assert_eq!(lc.load_package(&version.id).unwrap(), bytes);
    }

    #[test]
    fn duplicate_upload_keeps_the_first_package() {
        let (store, lc) = setup();
        let first = package(CHART);
        let version = lc.create_version(request(first.clone())).unwrap();

        let second = package("name: wordpress\nversion: 1.2.3\ndescription: changed\n");
        let err = lc.create_version(request(second)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let key = BlobKey::new("ws1", &version.id);
        assert_eq!(store.get_blob(&key).unwrap(), Some(first));
    }

    #[test]
    fn broken_package_is_rejected_before_any_write() {
        let (store, lc) = setup();

        let err = lc.create_version(request(b"not a tarball".to_vec())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let versions: Vec<ApplicationVersion> = store.list(&chartgrid_state::LabelSelector::new()).unwrap();
        assert!(versions.is_empty());
    }

    #[test]
    fn upload_for_unknown_application_fails() {
        let (_store, lc) = setup();
        let mut req = request(package(CHART));
        req.app_id = "missing".to_string();

        let err = lc.create_version(req).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_removes_version_and_package() {
        let (store, lc) = setup();
        let version = lc.create_version(request(package(CHART))).unwrap();

        lc.delete_version(&version.id).unwrap();
        assert!(store.get::<ApplicationVersion>(&version.id).unwrap().is_none());
        assert!(
            store
                .get_blob(&BlobKey::new("ws1", &version.id))
                .unwrap()
                .is_none()
        );

        let err = lc.delete_version(&version.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
