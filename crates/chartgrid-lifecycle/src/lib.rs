//! Chartgrid application version lifecycle.
//!
//! Versions move through review and publication by appending entries to
//! their audit record; the newest entry is the current state. Publishing a
//! version also refreshes the app-store copy of its application.
//!
//! # Components
//!
//! - **`action`**: lifecycle actions and the transition table
//! - **`machine`**: applies actions to versions and persists the audit record
//! - **`upload`**: creates versions from uploaded chart packages

pub mod action;
pub mod error;
pub mod machine;
pub mod upload;

pub use action::{Action, TransitionPolicy};
pub use error::{LifecycleError, LifecycleResult};
pub use machine::{Lifecycle, LifecycleSettings};
pub use upload::CreateVersionRequest;
