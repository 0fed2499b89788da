//! Lifecycle machine: applies operator actions to application versions.
//!
//! A version's state is the head of its audit record. Applying an action
//! prepends an entry and writes the record back to the catalog store as a
//! patch, so a concurrent writer surfaces as a conflict instead of a lost
//! update. Versions that only exist in a repository index are materialized
//! in the store on their first action.

use std::sync::Arc;

use tracing::{debug, info};

use chartgrid_core::{
    Application, ApplicationVersion, AuditEntry, ChartParser, ChartgridConfig, LABEL_APP_ID,
    epoch_secs, sort_versions,
};
use chartgrid_index::IndexCache;
use chartgrid_state::{BlobStore, CatalogStore, LabelSelector};

use crate::action::{Action, TransitionPolicy};
use crate::error::{LifecycleError, LifecycleResult};

/// Tunables for the lifecycle machine.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    /// Audit entries kept per version.
    pub max_audit_entries: usize,
    pub policy: TransitionPolicy,
    /// Suffix naming an application's app-store copy.
    pub store_suffix: String,
    /// Repo id stamped on uploaded versions.
    pub builtin_repo_id: String,
}

impl LifecycleSettings {
    pub fn from_config(config: &ChartgridConfig) -> Self {
        Self {
            max_audit_entries: config.lifecycle.max_audit_entries.max(1),
            policy: TransitionPolicy::from_strict(config.lifecycle.strict_transitions),
            store_suffix: config.catalog.store_suffix.clone(),
            builtin_repo_id: config.catalog.builtin_repo_id.clone(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&ChartgridConfig::default())
    }
}

pub struct Lifecycle<S> {
    pub(crate) store: S,
    pub(crate) cache: Arc<IndexCache>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) parser: Arc<dyn ChartParser>,
    pub(crate) settings: LifecycleSettings,
}

impl<S: CatalogStore> Lifecycle<S> {
    pub fn new(
        store: S,
        cache: Arc<IndexCache>,
        blobs: Arc<dyn BlobStore>,
        parser: Arc<dyn ChartParser>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            cache,
            blobs,
            parser,
            settings,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Apply `action` to a version and record who did it.
    ///
    /// Returns the version as persisted. Publishing actions also bring the
    /// application's app-store copy up to date with the canonical spec.
    pub async fn apply_action(
        &self,
        version_id: &str,
        action: &str,
        operator: &str,
        message: &str,
    ) -> LifecycleResult<ApplicationVersion> {
        let (base, persisted) = self.resolve_for_write(version_id).await?;
        let action: Action = action.parse()?;
        let current = base.state();
        self.settings.policy.check(action, current)?;

        let mut desired = base.clone();
        desired.audit.insert(
            0,
            AuditEntry {
                state: action.target(),
                operator: operator.to_string(),
                message: message.to_string(),
                time: epoch_secs(),
            },
        );
        desired.audit.truncate(self.settings.max_audit_entries);

        // Resolved before the write so a missing application fails the
        // action with nothing persisted.
        let canonical = if action.publishes() {
            Some(self.canonical_application(&base.app_id).await?)
        } else {
            None
        };

        let saved = if persisted {
            self.store.patch(&base, &desired)?
        } else {
            self.store.create(&desired)?
        };
        info!(
            version = %version_id,
            %action,
            from = %current,
            to = %saved.state(),
            operator,
            "applied lifecycle action"
        );

        if let Some(app) = canonical {
            self.sync_store_copy(&app)?;
        }
        Ok(saved)
    }

    /// Look up a version in the cache, falling back to the store.
    pub async fn get_version(&self, version_id: &str) -> LifecycleResult<ApplicationVersion> {
        if let Some(version) = self.cache.get_application_version(version_id).await {
            return Ok(version);
        }
        self.store
            .get(version_id)?
            .ok_or_else(|| LifecycleError::VersionNotFound(version_id.to_string()))
    }

    /// Versions of an application in version order.
    pub async fn list_versions(&self, app_id: &str) -> LifecycleResult<Vec<ApplicationVersion>> {
        if let Some(versions) = self.cache.list_application_versions(app_id).await {
            return Ok(versions);
        }
        let selector = LabelSelector::new().with(LABEL_APP_ID, app_id);
        let mut versions: Vec<ApplicationVersion> = self.store.list(&selector)?;
        sort_versions(&mut versions);
        Ok(versions)
    }

    /// Resolve the copy an action should be applied to and whether the
    /// store already holds it. A stored record carries the authoritative
    /// audit; a cache-only version is still in its indexed form.
    async fn resolve_for_write(
        &self,
        version_id: &str,
    ) -> LifecycleResult<(ApplicationVersion, bool)> {
        let cached = self.cache.get_application_version(version_id).await;
        if let Some(stored) = self.store.get::<ApplicationVersion>(version_id)? {
            return Ok((stored, true));
        }
        cached
            .map(|v| (v, false))
            .ok_or_else(|| LifecycleError::VersionNotFound(version_id.to_string()))
    }

    async fn canonical_application(&self, app_id: &str) -> LifecycleResult<Application> {
        if let Some(app) = self.cache.get_application(app_id).await {
            return Ok(app);
        }
        self.store
            .get::<Application>(app_id)?
            .ok_or_else(|| LifecycleError::ApplicationNotFound(app_id.to_string()))
    }

    fn sync_store_copy(&self, app: &Application) -> LifecycleResult<()> {
        let app_id = app.id.as_str();
        let copy_id = app.store_copy_id(&self.settings.store_suffix);
        let Some(copy) = self.store.get::<Application>(&copy_id)? else {
            debug!(app = %app_id, copy = %copy_id, "no app-store copy to sync");
            return Ok(());
        };
        if copy.spec == app.spec {
            return Ok(());
        }

        let mut desired = copy.clone();
        desired.spec = app.spec.clone();
        desired.updated_at = epoch_secs();
        self.store.patch(&copy, &desired)?;
        info!(app = %app_id, copy = %copy_id, "synced app-store copy");
        Ok(())
    }
}
