//! chartgrid-index: in-memory index of repository contents.
//!
//! Repos carry a snapshot of the charts they publish. The [`IndexCache`]
//! projects those snapshots into applications and versions keyed by id, and
//! the [`IndexListener`] keeps it current by following the catalog store's
//! watch stream.
//!
//! ```text
//! CatalogStore ──watch──▶ IndexListener ──on_repo_*──▶ IndexCache
//!                                                        ▲
//!                        lifecycle / release lookups ────┘
//! ```
//!
//! The cache is an optimization, not the source of truth: lookups return
//! `None` on a miss and callers decide whether to fall back to the store.

pub mod cache;
pub mod listener;

pub use cache::{CacheStats, IndexCache};
pub use listener::IndexListener;
