//! Error types for diffable-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ResourceId;

/// All errors that can arise from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse registry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.diffable/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The registry YAML file did not exist at the expected path.
    #[error("registry not found at {path}")]
    RegistryNotFound { path: PathBuf },

    /// Two descriptors in one registry file share an identifier.
    #[error("resource '{identifier}' is registered more than once in {path}")]
    DuplicateResource { identifier: ResourceId, path: PathBuf },
}

/// A diff that cannot be decoded or applied against its base.
///
/// Indices are UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("{identifier}: Invalid start index: {start}")]
    InvalidStart { identifier: ResourceId, start: i64, base_len: usize },

    #[error("{identifier}: Invalid end index: {end}")]
    InvalidEnd {
        identifier: ResourceId,
        start: i64,
        end: i64,
        base_len: usize,
    },

    #[error("{identifier}: reconstructed code is not valid UTF-16")]
    InvalidUtf16 { identifier: ResourceId },

    #[error("malformed diff payload at element {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("diff payload is not a JSON array: {0}")]
    Syntax(String),
}
