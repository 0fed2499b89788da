//! Chartgrid release manager.
//!
//! A release is one install of an application version into a namespace.
//! The manager owns the release records; the workloads behind them are
//! reconciled by an external installer that reports back through
//! [`ReleaseManager::set_status`].
//!
//! # Components
//!
//! - **`manager`**: create, upgrade, delete, and version resolution
//! - **`query`**: filtered, ordered, paginated listings
//! - **`inspect`**: release detail with the installer's rendered manifest

pub mod error;
pub mod inspect;
pub mod manager;
pub mod query;

#[cfg(test)]
mod fixtures;

pub use error::{ReleaseError, ReleaseResult};
pub use inspect::{ReleaseDetail, ReleaseInspector};
pub use manager::{ChartSource, CreateReleaseRequest, ReleaseManager, UpgradeReleaseRequest};
pub use query::{ListQuery, OrderBy, ReleaseList, ReleaseView};
