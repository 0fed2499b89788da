//! Tagged catalog items and the summaries built from them.
//!
//! Responses that mix entity types are shaped from a closed [`CatalogItem`]
//! enum so every decoration site matches exhaustively.

use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogItem {
    Application(Application),
    ApplicationVersion(ApplicationVersion),
    Release(Release),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Application,
    ApplicationVersion,
    Release,
}

/// Flat, transport-friendly view of any catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub kind: ItemKind,
    pub id: String,
    pub name: String,
    pub status: String,
    /// Chart version for versions and releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Owning application for versions and releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub updated_at: u64,
}

impl CatalogItem {
    pub fn summary(&self) -> ItemSummary {
        match self {
            CatalogItem::Application(app) => ItemSummary {
                kind: ItemKind::Application,
                id: app.id.clone(),
                name: if app.spec.display_name.is_empty() {
                    app.name.clone()
                } else {
                    app.spec.display_name.clone()
                },
                status: match app.status {
                    ApplicationStatus::Draft => "draft",
                    ApplicationStatus::Active => "active",
                    ApplicationStatus::Suspended => "suspended",
                }
                .to_string(),
                version: None,
                app_id: None,
                updated_at: app.updated_at.max(app.created_at),
            },
            CatalogItem::ApplicationVersion(v) => ItemSummary {
                kind: ItemKind::ApplicationVersion,
                id: v.id.clone(),
                name: v.name.clone(),
                status: v.state().to_string(),
                version: Some(v.version.clone()),
                app_id: Some(v.app_id.clone()),
                updated_at: v.audit.first().map(|a| a.time).unwrap_or(v.created_at),
            },
            CatalogItem::Release(r) => ItemSummary {
                kind: ItemKind::Release,
                id: r.id.clone(),
                name: r.name.clone(),
                status: r.status.to_string(),
                version: Some(r.chart.version.clone()),
                app_id: Some(r.app_id.clone()),
                updated_at: r.last_touched(),
            },
        }
    }
}

impl From<Application> for CatalogItem {
    fn from(app: Application) -> Self {
        CatalogItem::Application(app)
    }
}

impl From<ApplicationVersion> for CatalogItem {
    fn from(v: ApplicationVersion) -> Self {
        CatalogItem::ApplicationVersion(v)
    }
}

impl From<Release> for CatalogItem {
    fn from(r: Release) -> Self {
        CatalogItem::Release(r)
    }
}
