//! redb table definitions for the Chartgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values. Catalog tables hold
//! JSON-serialized entities; the blob table holds raw package bytes.

use redb::TableDefinition;

/// Repos keyed by `{repo_id}`.
pub const REPOS: TableDefinition<&str, &[u8]> = TableDefinition::new("repos");

/// Applications keyed by `{app_id}`.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Application versions keyed by `{version_id}`.
pub const APP_VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("app_versions");

/// Releases keyed by `{namespace}/{release_id}`.
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");

/// Chart package payloads keyed by `{workspace}/{version_id}`.
pub const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// Claimed unique keys, `{kind}/{unique_key}` → owning record's key.
pub const UNIQUE_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("unique_keys");
