//! chartgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ChartgridConfig {
    pub store: StoreConfig,
    pub catalog: CatalogConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file.
    pub path: PathBuf,
    /// Capacity of the catalog watch channel.
    pub event_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/chartgrid/catalog.redb"),
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Repo id of the built-in app store. Versions under it fall back to the
    /// catalog store on a cache miss.
    pub builtin_repo_id: String,
    /// Suffix appended to an application id to name its app-store copy.
    pub store_suffix: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            builtin_repo_id: "builtin-stable".to_string(),
            store_suffix: "-store".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Audit entries kept per version; older entries are dropped.
    pub max_audit_entries: usize,
    /// Reject actions whose precondition state does not match.
    pub strict_transitions: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_audit_entries: 20,
            strict_transitions: false,
        }
    }
}

impl ChartgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ChartgridConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.lifecycle.max_audit_entries == 0 {
            anyhow::bail!("lifecycle.max_audit_entries must be at least 1");
        }
        if self.store.event_buffer == 0 {
            anyhow::bail!("store.event_buffer must be at least 1");
        }
        if self.catalog.store_suffix.is_empty() {
            anyhow::bail!("catalog.store_suffix must not be empty");
        }
        Ok(())
    }
}
