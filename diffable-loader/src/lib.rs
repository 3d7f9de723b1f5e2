//! # diffable-loader
//!
//! Cache-aware resource loading.
//!
//! A [`Coordinator`] decides per resource whether to execute cached code,
//! fetch the full resource, or fetch a diff against the cached copy and
//! apply it. Transport, storage, and evaluation are collaborators behind the
//! [`Fetcher`], [`CacheStore`], and [`Evaluator`] traits.

pub mod cache_store;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod pending;

pub use cache_store::{CacheStore, CachedCode, FileCacheStore, MemoryCacheStore};
pub use coordinator::{Coordinator, Execution, LoadOutcome, LoadPhase};
pub use error::{CollaboratorError, LoadError, StoreError};
pub use fetch::{Completion, Evaluator, FetchKind, Fetcher};
pub use freshness::Freshness;
pub use pending::{PendingEntries, PendingGuard};
