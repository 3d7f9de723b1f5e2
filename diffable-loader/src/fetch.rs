//! Network and evaluation collaborator contracts.
//!
//! Non-blocking fetches are handed a [`Completion`]. Resolving it sends one
//! message back to the coordinator's channel; the coordinator processes it
//! on its own thread of control when its owner calls
//! [`Coordinator::pump`](crate::Coordinator::pump) or
//! [`Coordinator::settle`](crate::Coordinator::settle).

use std::fmt;

use tokio::sync::mpsc;

use diffable_core::ResourceId;

use crate::error::CollaboratorError;

/// What a fetch URL delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// A diff payload against the staged base.
    Diff,
    /// The full resource body.
    Full,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKind::Diff => write!(f, "diff"),
            FetchKind::Full => write!(f, "full"),
        }
    }
}

/// Transport for remote text.
pub trait Fetcher {
    /// Fetch `url` and return its body before returning.
    fn fetch_blocking(&mut self, url: &str) -> Result<String, CollaboratorError>;

    /// Start fetching `url`; resolve `completion` whenever the body arrives.
    fn fetch_non_blocking(&mut self, url: &str, completion: Completion);
}

/// Executes reconstructed source with top-level visibility.
pub trait Evaluator {
    fn evaluate_in_global_scope(&mut self, source: &str) -> Result<(), CollaboratorError>;
}

/// One resolved fetch, queued for the coordinator.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub identifier: ResourceId,
    pub kind: FetchKind,
    pub url: String,
    pub result: Result<String, CollaboratorError>,
}

/// Continuation token for a non-blocking fetch.
///
/// Can be moved to another thread or task. Dropping it unresolved leaves the
/// load in flight forever.
#[derive(Debug)]
#[must_use = "an unresolved completion leaves its resource loading forever"]
pub struct Completion {
    identifier: ResourceId,
    kind: FetchKind,
    url: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl Completion {
    pub(crate) fn new(
        identifier: ResourceId,
        kind: FetchKind,
        url: String,
        tx: mpsc::UnboundedSender<Delivery>,
    ) -> Self {
        Self {
            identifier,
            kind,
            url,
            tx,
        }
    }

    pub fn identifier(&self) -> &ResourceId {
        &self.identifier
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver the fetch result.
    pub fn complete(self, result: Result<String, CollaboratorError>) {
        let delivery = Delivery {
            identifier: self.identifier,
            kind: self.kind,
            url: self.url,
            result,
        };
        // The coordinator may be gone; nobody is left to care.
        if self.tx.send(delivery).is_err() {
            tracing::debug!("completion delivered after coordinator shut down");
        }
    }

    pub fn succeed(self, body: impl Into<String>) {
        self.complete(Ok(body.into()));
    }

    pub fn fail(self, error: impl Into<CollaboratorError>) {
        self.complete(Err(error.into()));
    }
}
