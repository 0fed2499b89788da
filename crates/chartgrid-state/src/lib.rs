//! chartgrid-state: catalog and blob storage for Chartgrid.
//!
//! The [`CatalogStore`] and [`BlobStore`] traits are the boundary the index
//! cache, lifecycle, and release crates program against. [`StateStore`] is
//! the embedded implementation, backed by [redb](https://docs.rs/redb).
//!
//! # Architecture
//!
//! Entities are JSON-serialized into redb's `&[u8]` value columns, one table
//! per entity kind. Every write bumps the entity's `resource_version`;
//! `update` and `patch` refuse to write over a newer version. Committed writes
//! are published on a broadcast channel so consumers can follow changes.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod catalog;
pub mod entity;
pub mod error;
pub mod patch;
pub mod store;
pub mod tables;

pub use catalog::{BlobKey, BlobStore, CatalogStore};
pub use entity::{Entity, EntityKind, EventType, LabelSelector, StoreObject, WatchEvent};
pub use error::{StateError, StateResult};
pub use store::StateStore;
