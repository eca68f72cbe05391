//! Error taxonomy for the resource store

use crate::resource::ResourceType;
use thiserror::Error;

/// Errors raised by path parsing and resource operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Path is syntactically unsafe (traversal segment, blocked character, absolute)
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Operation is incompatible with the resource's current type
    #[error("cannot {operation} {path:?}: resource is {actual}")]
    State {
        path: String,
        actual: ResourceType,
        operation: &'static str,
    },

    /// Creation requested for a resource that is already defined
    #[error("{path:?} already exists as {kind}")]
    AlreadyExists { path: String, kind: ResourceType },

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for validation failures (bad path syntax)
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::InvalidPath { .. })
    }

    /// True for type/state mismatches
    pub fn is_state(&self) -> bool {
        matches!(self, StoreError::State { .. })
    }
}

/// Common result type used throughout rstore-core
pub type Result<T> = std::result::Result<T, StoreError>;
