//! Release detail, enriched with the installer's live view when available.

use serde::Serialize;
use tracing::warn;

use chartgrid_core::{ApplicationVersion, Release};
use chartgrid_state::CatalogStore;

use crate::error::ReleaseResult;
use crate::manager::ReleaseManager;

/// The installer side of a release.
pub trait ReleaseInspector: Send + Sync {
    /// Manifest currently rendered for the release.
    fn rendered_manifest(&self, release: &Release) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseDetail {
    pub release: Release,
    pub version: ApplicationVersion,
    /// Absent when no installer is attached or it could not answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
}

impl<S: CatalogStore> ReleaseManager<S> {
    pub async fn describe_release(&self, namespace: &str, id: &str) -> ReleaseResult<ReleaseDetail> {
        let release = self.get_release(namespace, id)?;
        let version = self
            .get_app_version(&release.repo_id, &release.version_id)
            .await?;

        let manifest = self
            .inspector
            .as_ref()
            .and_then(|inspector| match inspector.rendered_manifest(&release) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(release_id = %release.id, error = %e, "failed to render release manifest");
                    None
                }
            });

        Ok(ReleaseDetail {
            release,
            version,
            manifest,
        })
    }
}
