//! Release listings: label filters, ordering, pagination, decoration.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::warn;

use chartgrid_core::{
    CatalogItem, ItemSummary, LABEL_APP_ID, LABEL_NAMESPACE, LABEL_VERSION_ID, LABEL_WORKSPACE,
    Release,
};
use chartgrid_state::{CatalogStore, LabelSelector};

use crate::error::ReleaseResult;
use crate::manager::ReleaseManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Most recently updated first, falling back to creation time.
    #[default]
    LastUpdated,
    /// Newest first.
    CreateTime,
    /// Alphabetical.
    Name,
}

/// Filters and paging for [`ReleaseManager::list_releases`]. Empty filters
/// match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub workspace: String,
    pub namespace: String,
    pub app_id: String,
    pub version_id: String,
    /// Page size; `None` returns everything after `offset`.
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: OrderBy,
    pub reverse: bool,
    /// App-store listings drop releases whose version cannot be resolved
    /// instead of failing.
    pub app_store_view: bool,
}

impl ListQuery {
    fn selector(&self) -> LabelSelector {
        LabelSelector::new()
            .with_nonempty(LABEL_WORKSPACE, &self.workspace)
            .with_nonempty(LABEL_NAMESPACE, &self.namespace)
            .with_nonempty(LABEL_APP_ID, &self.app_id)
            .with_nonempty(LABEL_VERSION_ID, &self.version_id)
    }
}

/// A release decorated with summaries of itself and its version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseView {
    pub release: Release,
    pub summary: ItemSummary,
    pub version: ItemSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseList {
    /// Releases matching the filters, before pagination.
    pub total: usize,
    pub items: Vec<ReleaseView>,
}

pub(crate) fn compare(a: &Release, b: &Release, order_by: OrderBy) -> Ordering {
    let by_name = || a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id));
    match order_by {
        OrderBy::LastUpdated => b.last_touched().cmp(&a.last_touched()).then_with(by_name),
        OrderBy::CreateTime => b.created_at.cmp(&a.created_at).then_with(by_name),
        OrderBy::Name => by_name(),
    }
}

pub(crate) fn sort_releases(releases: &mut [Release], order_by: OrderBy, reverse: bool) {
    releases.sort_by(|a, b| {
        let ord = compare(a, b, order_by);
        if reverse { ord.reverse() } else { ord }
    });
}

impl<S: CatalogStore> ReleaseManager<S> {
    pub async fn list_releases(&self, query: &ListQuery) -> ReleaseResult<ReleaseList> {
        let mut releases: Vec<Release> = self.store.list(&query.selector())?;
        sort_releases(&mut releases, query.order_by, query.reverse);
        let total = releases.len();

        let page = releases
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX));

        let mut items = Vec::new();
        for release in page {
            let version = match self
                .get_app_version(&release.repo_id, &release.version_id)
                .await
            {
                Ok(version) => version,
                Err(e) if query.app_store_view => {
                    warn!(
                        release_id = %release.id,
                        version = %release.version_id,
                        error = %e,
                        "skipping release with unresolvable version"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            items.push(ReleaseView {
                summary: CatalogItem::from(release.clone()).summary(),
                version: CatalogItem::from(version).summary(),
                release,
            });
        }

        Ok(ReleaseList { total, items })
    }
}
