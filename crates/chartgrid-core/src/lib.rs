//! chartgrid-core: shared types for the Chartgrid catalog.
//!
//! Everything the index cache, the lifecycle state machine, and the release
//! manager agree on lives here: the catalog entities, the error taxonomy,
//! repository index snapshots, chart package metadata, and version ordering.

pub mod chart;
pub mod config;
pub mod error;
pub mod item;
pub mod snapshot;
pub mod types;
pub mod version;

pub use chart::{ChartError, ChartMetadata, ChartParser, TarballChartParser};
pub use config::ChartgridConfig;
pub use error::ErrorKind;
pub use item::{CatalogItem, ItemKind, ItemSummary};
pub use snapshot::{IndexSnapshot, RepoProjection, SnapshotError};
pub use types::*;
pub use version::{compare_versions, sort_versions};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
