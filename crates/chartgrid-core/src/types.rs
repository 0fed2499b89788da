//! Catalog entities.
//!
//! These types are what the catalog store persists and what the index cache
//! projects out of repository snapshots. All of them are JSON-serializable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type RepoId = String;
pub type ApplicationId = String;
pub type VersionId = String;
pub type ReleaseId = String;

/// Label carrying the owning application id.
pub const LABEL_APP_ID: &str = "chartgrid.io/app-id";
/// Label carrying the application version id.
pub const LABEL_VERSION_ID: &str = "chartgrid.io/app-version-id";
/// Label carrying the source repository id.
pub const LABEL_REPO_ID: &str = "chartgrid.io/repo-id";
/// Label carrying the tenant workspace.
pub const LABEL_WORKSPACE: &str = "chartgrid.io/workspace";
/// Label carrying the namespace a release is installed into.
pub const LABEL_NAMESPACE: &str = "chartgrid.io/namespace";

// ── Repo ───────────────────────────────────────────────────────────

/// A registered, periodically crawled source of chart packages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    /// Owning workspace; empty for global repos.
    #[serde(default)]
    pub workspace: String,
    pub url: String,
    #[serde(default)]
    pub credential: Option<String>,
    /// Crawl period in seconds.
    #[serde(default)]
    pub sync_period_secs: u64,
    /// Serialized [`IndexSnapshot`](crate::snapshot::IndexSnapshot).
    #[serde(default)]
    pub index_snapshot: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub resource_version: u64,
}

// ── Application ────────────────────────────────────────────────────

/// Descriptive metadata of an application. This is the part mirrored into
/// the app-store shadow copy when a version is published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ApplicationSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Draft,
    Active,
    Suspended,
}

/// A named lineage of a distributable chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    /// Owning workspace; empty for global applications.
    #[serde(default)]
    pub workspace: String,
    /// Source repository; empty for built-in store applications.
    #[serde(default)]
    pub repo_id: RepoId,
    pub spec: ApplicationSpec,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub resource_version: u64,
}

impl Application {
    /// Id of the app-store shadow copy of this application.
    pub fn store_copy_id(&self, suffix: &str) -> ApplicationId {
        format!("{}{suffix}", self.id)
    }
}

// ── Application version ────────────────────────────────────────────

/// Lifecycle state of an application version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    #[default]
    Draft,
    Submitted,
    Passed,
    Rejected,
    Active,
    Suspended,
}

impl VersionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionState::Draft => "draft",
            VersionState::Submitted => "submitted",
            VersionState::Passed => "passed",
            VersionState::Rejected => "rejected",
            VersionState::Active => "active",
            VersionState::Suspended => "suspended",
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a version's audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub state: VersionState,
    pub operator: String,
    #[serde(default)]
    pub message: String,
    pub time: u64,
}

/// One installable revision of an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApplicationVersion {
    pub id: VersionId,
    pub app_id: ApplicationId,
    #[serde(default)]
    pub repo_id: RepoId,
    #[serde(default)]
    pub workspace: String,
    /// Chart name.
    pub name: String,
    /// Semantic version of the chart.
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub icon: String,
    /// Package download locations (repo-sourced versions only).
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub created_at: u64,
    /// Most recent entry first.
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_version: u64,
}

impl ApplicationVersion {
    /// Current lifecycle state: the head of the audit record.
    pub fn state(&self) -> VersionState {
        self.audit.first().map(|a| a.state).unwrap_or_default()
    }

    pub fn chart_ref(&self) -> ChartRef {
        ChartRef {
            name: self.name.clone(),
            version: self.version.clone(),
            app_version: self.app_version.clone(),
        }
    }
}

// ── Release ────────────────────────────────────────────────────────

/// Status of an installed release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    #[default]
    Pending,
    Active,
    Upgrading,
    Failed,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Pending => "pending",
            ReleaseStatus::Active => "active",
            ReleaseStatus::Upgrading => "upgrading",
            ReleaseStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReleaseStatus::Pending),
            "active" => Ok(ReleaseStatus::Active),
            "upgrading" => Ok(ReleaseStatus::Upgrading),
            "failed" => Ok(ReleaseStatus::Failed),
            other => Err(format!("unknown release status: {other}")),
        }
    }
}

/// Chart identity copied from the application version into a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChartRef {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: String,
}

/// An installed instance of one application version in a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Release {
    pub id: ReleaseId,
    /// Display name, unique within the namespace.
    pub name: String,
    #[serde(default)]
    pub workspace: String,
    pub namespace: String,
    pub app_id: ApplicationId,
    #[serde(default)]
    pub repo_id: RepoId,
    pub version_id: VersionId,
    pub chart: ChartRef,
    /// Opaque configuration values payload handed to the installer.
    #[serde(default)]
    pub config_values: String,
    pub revision: u32,
    #[serde(default)]
    pub status: ReleaseStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub created_at: u64,
    /// Zero until the release is first modified.
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_version: u64,
}

impl Release {
    /// Build the composite key for the releases table.
    pub fn table_key(&self) -> String {
        Self::key_for(&self.namespace, &self.id)
    }

    pub fn key_for(namespace: &str, id: &str) -> String {
        format!("{namespace}/{id}")
    }

    /// Labels every release carries for selector-based listing.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_APP_ID.to_string(), self.app_id.clone()),
            (LABEL_VERSION_ID.to_string(), self.version_id.clone()),
            (LABEL_WORKSPACE.to_string(), self.workspace.clone()),
            (LABEL_NAMESPACE.to_string(), self.namespace.clone()),
        ])
    }

    /// Timestamp used for recency ordering: last update, else creation.
    pub fn last_touched(&self) -> u64 {
        if self.updated_at > 0 {
            self.updated_at
        } else {
            self.created_at
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_state_is_head_of_audit() {
        let mut v = ApplicationVersion::default();
        assert_eq!(v.state(), VersionState::Draft);

        v.audit = vec![
            AuditEntry {
                state: VersionState::Passed,
                operator: "admin".into(),
                message: String::new(),
                time: 20,
            },
            AuditEntry {
                state: VersionState::Submitted,
                operator: "dev".into(),
                message: String::new(),
                time: 10,
            },
        ];
        assert_eq!(v.state(), VersionState::Passed);
    }

    #[test]
    fn release_last_touched_prefers_update_time() {
        let mut r = Release {
            created_at: 100,
            ..Default::default()
        };
        assert_eq!(r.last_touched(), 100);
        r.updated_at = 150;
        assert_eq!(r.last_touched(), 150);
    }

    #[test]
    fn release_status_parses_wire_names() {
        assert_eq!("active".parse::<ReleaseStatus>(), Ok(ReleaseStatus::Active));
        assert!("installed".parse::<ReleaseStatus>().is_err());
    }

    #[test]
    fn store_copy_id_appends_suffix() {
        let app = Application {
            id: "app-123".into(),
            ..Default::default()
        };
        assert_eq!(app.store_copy_id("-store"), "app-123-store");
    }
}
