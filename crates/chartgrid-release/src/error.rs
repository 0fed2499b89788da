//! Release manager error types.

use chartgrid_core::{ErrorKind, ReleaseStatus};
use chartgrid_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("invalid release request: {0}")]
    InvalidRequest(String),

    #[error("application version not found: {0}")]
    VersionNotFound(String),

    #[error("release not found: {namespace}/{id}")]
    ReleaseNotFound { namespace: String, id: String },

    #[error("chart package not found for version: {0}")]
    PackageNotFound(String),

    #[error("release name {name} already used in namespace {namespace}")]
    NameTaken { namespace: String, name: String },

    #[error("release {id} is {status}, only active releases can be upgraded")]
    NotActive { id: String, status: ReleaseStatus },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::InvalidRequest(_) | ReleaseError::NotActive { .. } => {
                ErrorKind::InvalidArgument
            }
            ReleaseError::VersionNotFound(_)
            | ReleaseError::ReleaseNotFound { .. }
            | ReleaseError::PackageNotFound(_) => ErrorKind::NotFound,
            ReleaseError::NameTaken { .. } => ErrorKind::AlreadyExists,
            ReleaseError::State(e) => e.kind(),
        }
    }
}

pub type ReleaseResult<T> = Result<T, ReleaseError>;
