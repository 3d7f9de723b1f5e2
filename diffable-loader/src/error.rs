//! Error types for diffable-loader.

use std::path::PathBuf;

use thiserror::Error;

use diffable_core::{PatchError, ResourceId};

/// Opaque failure surfaced by a fetch, store, or evaluation collaborator.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can arise while loading a resource.
///
/// Collaborator failures keep their original error as `source`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The diff could not be decoded or does not fit its base.
    #[error("malformed diff: {0}")]
    MalformedDiff(#[from] PatchError),

    /// No descriptor is published for the identifier.
    #[error("resource '{identifier}' is not registered")]
    UnknownResource { identifier: ResourceId },

    /// A load for the identifier is already in flight.
    #[error("resource '{identifier}' is already loading")]
    AlreadyInFlight { identifier: ResourceId },

    /// `apply_and_execute` was called without staged code.
    #[error("resource '{identifier}' has no pending code to execute")]
    NotPending { identifier: ResourceId },

    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("cache store error for key '{key}': {source}")]
    Store {
        key: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("evaluation of '{identifier}' failed: {source}")]
    Eval {
        identifier: ResourceId,
        #[source]
        source: CollaboratorError,
    },
}

/// Errors from the file-backed cache store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (cache record).
    #[error("cache record JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The key cannot be used as a file name.
    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
