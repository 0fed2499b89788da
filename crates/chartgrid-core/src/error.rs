//! Error taxonomy shared by every Chartgrid crate.
//!
//! Each crate keeps its own `thiserror` enum; all of them map onto an
//! [`ErrorKind`] so a transport layer can turn any failure into a status code
//! without knowing which component produced it.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Entity absent from both cache and store.
    NotFound,
    /// Name or key collision on create.
    AlreadyExists,
    /// Unrecognized lifecycle action, rejected transition, or malformed request.
    InvalidArgument,
    /// Concurrent modification detected by the store.
    Conflict,
    /// Store or blob transport failure.
    Unavailable,
    /// Decode or parse failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
