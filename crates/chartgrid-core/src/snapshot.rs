//! Repository index snapshots.
//!
//! A repo carries the result of its last crawl as a JSON document mapping
//! application name → {metadata, versions}. [`RepoProjection::from_repo`]
//! turns that document into the `Application`/`ApplicationVersion` records the
//! index cache serves.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::types::*;

/// Operator recorded on audit entries synthesized for repo-sourced versions.
pub const SYSTEM_OPERATOR: &str = "system";

const ID_HASH_LEN: usize = 14;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed index snapshot for repo {repo}: {reason}")]
    Malformed { repo: String, reason: String },

    #[error("repo {repo}: application {app} has an empty version string")]
    EmptyVersion { repo: String, app: String },

    #[error("repo {repo}: application with empty name")]
    EmptyName { repo: String },

    #[error("repo {repo}: application {app} has an empty explicit id")]
    EmptyId { repo: String, app: String },

    #[error("repo {repo}: id {id} is used more than once")]
    DuplicateId { repo: String, id: String },
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// The decoded snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub generated: u64,
    #[serde(default)]
    pub applications: BTreeMap<String, SnapshotApplication>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotApplication {
    #[serde(default)]
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotMetadata {
    /// Explicit application id; derived from repo id and name when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotVersion {
    #[serde(default)]
    pub id: Option<String>,
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub created: u64,
}

impl IndexSnapshot {
    /// Decode a snapshot document. An empty document is a repo that has not
    /// been crawled yet and decodes to an empty snapshot.
    pub fn decode(repo_id: &str, raw: &str) -> Result<Self, SnapshotError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| SnapshotError::Malformed {
            repo: repo_id.to_string(),
            reason: e.to_string(),
        })
    }

}

/// One application and its versions as contributed by a repo.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedApplication {
    pub application: Application,
    pub versions: Vec<ApplicationVersion>,
}

/// Everything a single repo contributes to the index cache.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepoProjection {
    pub repo_id: RepoId,
    pub applications: Vec<ProjectedApplication>,
}

impl RepoProjection {
    /// Decode the repo's snapshot and synthesize its projections.
    pub fn from_repo(repo: &Repo) -> Result<Self, SnapshotError> {
        let snapshot = IndexSnapshot::decode(&repo.id, &repo.index_snapshot)?;
        let mut applications = Vec::with_capacity(snapshot.applications.len());
        let mut seen_apps = HashSet::new();
        let mut seen_versions = HashSet::new();

        for (name, entry) in &snapshot.applications {
            if name.trim().is_empty() {
                return Err(SnapshotError::EmptyName {
                    repo: repo.id.clone(),
                });
            }
            let app_id = match &entry.metadata.id {
                Some(id) if id.trim().is_empty() => {
                    return Err(SnapshotError::EmptyId {
                        repo: repo.id.clone(),
                        app: name.clone(),
                    });
                }
                Some(id) => id.clone(),
                None => derive_id("app", &[repo.id.as_str(), name.as_str()]),
            };
            if !seen_apps.insert(app_id.clone()) {
                return Err(SnapshotError::DuplicateId {
                    repo: repo.id.clone(),
                    id: app_id,
                });
            }
            let application = project_application(repo, &app_id, name, entry, snapshot.generated);

            let mut versions = Vec::with_capacity(entry.versions.len());
            for sv in &entry.versions {
                if sv.version.trim().is_empty() {
                    return Err(SnapshotError::EmptyVersion {
                        repo: repo.id.clone(),
                        app: name.clone(),
                    });
                }
                if sv.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
                    return Err(SnapshotError::EmptyId {
                        repo: repo.id.clone(),
                        app: name.clone(),
                    });
                }
                let version = project_version(repo, &app_id, name, entry, sv);
                if !seen_versions.insert(version.id.clone()) {
                    return Err(SnapshotError::DuplicateId {
                        repo: repo.id.clone(),
                        id: version.id,
                    });
                }
                versions.push(version);
            }

            applications.push(ProjectedApplication {
                application,
                versions,
            });
        }

        Ok(Self {
            repo_id: repo.id.clone(),
            applications,
        })
    }

    pub fn application_ids(&self) -> impl Iterator<Item = &str> {
        self.applications.iter().map(|p| p.application.id.as_str())
    }
}

fn project_application(
    repo: &Repo,
    app_id: &str,
    name: &str,
    entry: &SnapshotApplication,
    generated: u64,
) -> Application {
    let meta = &entry.metadata;
    let created_at = entry
        .versions
        .iter()
        .map(|v| v.created)
        .filter(|c| *c > 0)
        .min()
        .unwrap_or(generated);
    let updated_at = entry
        .versions
        .iter()
        .map(|v| v.created)
        .max()
        .unwrap_or(generated);

    Application {
        id: app_id.to_string(),
        name: name.to_string(),
        workspace: repo.workspace.clone(),
        repo_id: repo.id.clone(),
        spec: ApplicationSpec {
            display_name: meta.display_name.clone().unwrap_or_else(|| name.to_string()),
            description: meta.description.clone(),
            icon: meta.icon.clone(),
            home: meta.home.clone(),
            keywords: meta.keywords.clone(),
            maintainers: meta.maintainers.clone(),
            sources: meta.sources.clone(),
        },
        status: ApplicationStatus::Active,
        labels: BTreeMap::from([
            (LABEL_REPO_ID.to_string(), repo.id.clone()),
            (LABEL_WORKSPACE.to_string(), repo.workspace.clone()),
        ]),
        created_at,
        updated_at,
        resource_version: 0,
    }
}

fn project_version(
    repo: &Repo,
    app_id: &str,
    name: &str,
    entry: &SnapshotApplication,
    sv: &SnapshotVersion,
) -> ApplicationVersion {
    let id = sv
        .id
        .clone()
        .unwrap_or_else(|| derive_id("appv", &[repo.id.as_str(), name, sv.version.as_str()]));
    let description = if sv.description.is_empty() {
        entry.metadata.description.clone()
    } else {
        sv.description.clone()
    };

    ApplicationVersion {
        id,
        app_id: app_id.to_string(),
        repo_id: repo.id.clone(),
        workspace: repo.workspace.clone(),
        name: name.to_string(),
        version: sv.version.clone(),
        app_version: sv.app_version.clone(),
        description,
        home: entry.metadata.home.clone(),
        icon: entry.metadata.icon.clone(),
        urls: sv.urls.clone(),
        digest: sv.digest.clone(),
        created_at: sv.created,
        audit: vec![AuditEntry {
            state: VersionState::Active,
            operator: SYSTEM_OPERATOR.to_string(),
            message: String::new(),
            time: sv.created,
        }],
        labels: BTreeMap::from([
            (LABEL_APP_ID.to_string(), app_id.to_string()),
            (LABEL_REPO_ID.to_string(), repo.id.clone()),
        ]),
        resource_version: 0,
    }
}

/// Stable short id: `{prefix}-` + the first hex chars of SHA-256 over the
/// `/`-joined parts.
pub fn derive_id(prefix: &str, parts: &[&str]) -> String {
    let digest = Sha256::digest(parts.join("/").as_bytes());
    let hex = hex::encode(digest);
    format!("{prefix}-{}", &hex[..ID_HASH_LEN])
}
