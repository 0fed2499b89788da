//! Lifecycle error types.

use chartgrid_core::{ChartError, ErrorKind, VersionState};
use chartgrid_state::StateError;
use thiserror::Error;

use crate::action::Action;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("application version not found: {0}")]
    VersionNotFound(String),

    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("chart package not found for version: {0}")]
    PackageNotFound(String),

    #[error("unknown lifecycle action: {0}")]
    UnknownAction(String),

    #[error("cannot {action} a version in state {current}")]
    InvalidTransition { action: Action, current: VersionState },

    #[error("invalid chart package: {0}")]
    Chart(#[from] ChartError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::VersionNotFound(_)
            | LifecycleError::ApplicationNotFound(_)
            | LifecycleError::PackageNotFound(_) => ErrorKind::NotFound,
            LifecycleError::UnknownAction(_) | LifecycleError::InvalidTransition { .. } => {
                ErrorKind::InvalidArgument
            }
            LifecycleError::Chart(e) => e.kind(),
            LifecycleError::State(e) => e.kind(),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
