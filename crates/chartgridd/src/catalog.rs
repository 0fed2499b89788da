//! Wiring of the catalog components around one state store.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use chartgrid_core::{ChartgridConfig, TarballChartParser};
use chartgrid_index::IndexCache;
use chartgrid_lifecycle::{Lifecycle, LifecycleSettings};
use chartgrid_release::ReleaseManager;
use chartgrid_state::StateStore;

pub struct Catalog {
    pub config: ChartgridConfig,
    pub store: StateStore,
    pub cache: Arc<IndexCache>,
    pub lifecycle: Lifecycle<StateStore>,
    pub releases: ReleaseManager<StateStore>,
}

impl Catalog {
    /// Open the store named by the config and warm the index from it.
    pub async fn open(config: ChartgridConfig) -> anyhow::Result<Self> {
        let path = &config.store.path;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {}", dir.display()))?;
        }
        let store = StateStore::open(path, config.store.event_buffer)
            .with_context(|| format!("opening catalog store {}", path.display()))?;
        info!(path = ?path, "catalog store opened");

        let cache = Arc::new(IndexCache::new());
        let repos = cache.resync(&store).await?;
        info!(repos, "index cache warmed");

        let lifecycle = Lifecycle::new(
            store.clone(),
            cache.clone(),
            Arc::new(store.clone()),
            Arc::new(TarballChartParser),
            LifecycleSettings::from_config(&config),
        );
        let releases = ReleaseManager::new(
            store.clone(),
            cache.clone(),
            Arc::new(store.clone()),
            config.catalog.builtin_repo_id.clone(),
        );

        Ok(Self {
            config,
            store,
            cache,
            lifecycle,
            releases,
        })
    }
}
