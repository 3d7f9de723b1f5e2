//! Resource load coordinator.
//!
//! Per identifier:
//!
//! ```text
//! Idle → Requested → {CacheHitCurrent, CacheHitStale, CacheMiss}
//!      → Fetching(diff|full) → Received → [Patching] → [CacheWrite]
//!      → Evaluated → Idle
//! ```
//!
//! `Failed` is reachable from Fetching, Patching, CacheWrite, and Evaluated.
//! Both terminal states drop the pending entry before the error or result
//! reaches the caller.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;

use diffable_core::{Diff, Registry, ResourceDescriptor, ResourceId, Version};

use crate::cache_store::CacheStore;
use crate::error::LoadError;
use crate::fetch::{Completion, Delivery, Evaluator, FetchKind, Fetcher};
use crate::freshness::{self, Freshness};
use crate::pending::PendingEntries;

/// Position of a resource in the load state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Requested,
    CacheHitCurrent,
    CacheHitStale,
    CacheMiss,
    Fetching(FetchKind),
    Received(FetchKind),
    Patching,
    CacheWrite,
    Evaluated,
    Failed,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::Requested => write!(f, "requested"),
            LoadPhase::CacheHitCurrent => write!(f, "cache-hit-current"),
            LoadPhase::CacheHitStale => write!(f, "cache-hit-stale"),
            LoadPhase::CacheMiss => write!(f, "cache-miss"),
            LoadPhase::Fetching(kind) => write!(f, "fetching-{kind}"),
            LoadPhase::Received(kind) => write!(f, "received-{kind}"),
            LoadPhase::Patching => write!(f, "patching"),
            LoadPhase::CacheWrite => write!(f, "cache-write"),
            LoadPhase::Evaluated => write!(f, "evaluated"),
            LoadPhase::Failed => write!(f, "failed"),
        }
    }
}

/// A resource that reached evaluation successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub identifier: ResourceId,
    pub version: Version,
    /// A diff was applied to the staged base.
    pub patched: bool,
    /// The reconstructed code was written to the cache.
    pub cached: bool,
}

/// Where a request stands when its call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Executed(Execution),
    /// A non-blocking fetch was issued; its completion finishes the load.
    Fetching {
        identifier: ResourceId,
        url: String,
        kind: FetchKind,
    },
}

/// Owns the pending entries and drives the fetch, cache, and eval
/// collaborators for every resource published in its registry.
pub struct Coordinator<F, S, E> {
    registry: Registry,
    fetcher: F,
    store: S,
    evaluator: E,
    pending: PendingEntries,
    outstanding: HashMap<ResourceId, FetchKind>,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl<F, S, E> Coordinator<F, S, E>
where
    F: Fetcher,
    S: CacheStore,
    E: Evaluator,
{
    pub fn new(registry: Registry, fetcher: F, store: S, evaluator: E) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry,
            fetcher,
            store,
            evaluator,
            pending: PendingEntries::new(),
            outstanding: HashMap::new(),
            tx,
            rx,
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Load `identifier` through the cache.
    ///
    /// - no store or no record: fetch the full resource (non-blocking)
    /// - record at the current version: execute it now
    /// - older record: stage it and fetch the diff from its version
    pub fn request_by_cache(&mut self, identifier: &ResourceId) -> Result<LoadOutcome, LoadError> {
        self.ensure_idle(identifier)?;
        let descriptor = self.descriptor(identifier)?.clone();
        trace_phase(identifier, LoadPhase::Requested);

        let key = identifier.cache_key();
        let record = if self.store.is_available() {
            self.store.get(key).map_err(|source| LoadError::Store {
                key: key.to_string(),
                source,
            })?
        } else {
            tracing::debug!(%identifier, "cache store unavailable");
            None
        };

        let Some(record) = record else {
            trace_phase(identifier, LoadPhase::CacheMiss);
            let url = descriptor.resource_url();
            return Ok(self.dispatch(identifier, FetchKind::Full, url));
        };

        self.pending.stage(identifier.clone(), record.code);
        if record.version == descriptor.current_version {
            trace_phase(identifier, LoadPhase::CacheHitCurrent);
            return self
                .apply_and_execute(identifier, None)
                .map(LoadOutcome::Executed);
        }

        trace_phase(identifier, LoadPhase::CacheHitStale);
        tracing::debug!(
            %identifier,
            cached = %record.version,
            current = %descriptor.current_version,
            "cached copy is stale"
        );
        let url = descriptor.diff_url(&record.version);
        Ok(self.dispatch(identifier, FetchKind::Diff, url))
    }

    /// Load `identifier` from code delivered inline at `version`.
    ///
    /// When `version` is not current, the diff is fetched blocking for
    /// synchronous descriptors (and applied before this returns), otherwise
    /// non-blocking.
    pub fn bootstrap(
        &mut self,
        identifier: &ResourceId,
        code: impl Into<String>,
        version: &Version,
    ) -> Result<LoadOutcome, LoadError> {
        self.ensure_idle(identifier)?;
        let descriptor = self.descriptor(identifier)?.clone();
        trace_phase(identifier, LoadPhase::Requested);

        self.pending.stage(identifier.clone(), code.into());
        if *version == descriptor.current_version {
            return self
                .apply_and_execute(identifier, None)
                .map(LoadOutcome::Executed);
        }

        let url = descriptor.diff_url(version);
        if !descriptor.synchronous {
            return Ok(self.dispatch(identifier, FetchKind::Diff, url));
        }

        trace_phase(identifier, LoadPhase::Fetching(FetchKind::Diff));
        let body = match self.fetcher.fetch_blocking(&url) {
            Ok(body) => body,
            Err(source) => {
                self.fail(identifier);
                return Err(LoadError::Fetch { url, source });
            }
        };
        trace_phase(identifier, LoadPhase::Received(FetchKind::Diff));
        self.apply_payload(identifier, &body).map(LoadOutcome::Executed)
    }

    /// Apply `diff` (if any) to the staged code, write the result back to
    /// the cache when it changed or was never cached, then evaluate it.
    ///
    /// The pending entry is removed on every exit path; errors are
    /// returned after that, unchanged.
    pub fn apply_and_execute(
        &mut self,
        identifier: &ResourceId,
        diff: Option<&Diff>,
    ) -> Result<Execution, LoadError> {
        let Some(mut entry) = self.pending.guard(identifier) else {
            return Err(LoadError::NotPending {
                identifier: identifier.clone(),
            });
        };

        let result = (|| -> Result<Execution, LoadError> {
            let descriptor = self
                .registry
                .get(identifier)
                .ok_or_else(|| LoadError::UnknownResource {
                    identifier: identifier.clone(),
                })?;

            if let Some(diff) = diff {
                trace_phase(identifier, LoadPhase::Patching);
                let patched = diff.apply(identifier, entry.code())?;
                entry.replace(patched);
            }

            let mut cached = false;
            if self.store.is_available() {
                let key = identifier.cache_key();
                let store_err = |source| LoadError::Store {
                    key: key.to_string(),
                    source,
                };
                let has_record = self.store.has_any(key).map_err(store_err)?;
                if diff.is_some() || !has_record {
                    trace_phase(identifier, LoadPhase::CacheWrite);
                    self.store
                        .set(key, &descriptor.current_version, entry.code())
                        .map_err(store_err)?;
                    cached = true;
                    tracing::info!(
                        %identifier,
                        version = %descriptor.current_version,
                        "cached resource"
                    );
                }
            }

            self.evaluator
                .evaluate_in_global_scope(entry.code())
                .map_err(|source| LoadError::Eval {
                    identifier: identifier.clone(),
                    source,
                })?;
            trace_phase(identifier, LoadPhase::Evaluated);

            Ok(Execution {
                identifier: identifier.clone(),
                version: descriptor.current_version.clone(),
                patched: diff.is_some(),
                cached,
            })
        })();

        if let Err(err) = &result {
            tracing::warn!(%identifier, phase = %LoadPhase::Failed, error = %err, "load failed");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Completions
    // -----------------------------------------------------------------------

    /// Process every completion delivered so far, in arrival order.
    pub fn pump(&mut self) -> Vec<Result<Execution, LoadError>> {
        let mut outcomes = Vec::new();
        while let Ok(delivery) = self.rx.try_recv() {
            outcomes.push(self.process(delivery));
        }
        outcomes
    }

    /// Process completions until no non-blocking fetch is outstanding.
    ///
    /// Never resolves if a fetch never completes; bound it with a timeout.
    pub async fn settle(&mut self) -> Vec<Result<Execution, LoadError>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Wait for one completion and process it.
    ///
    /// Returns `None` once no non-blocking fetch is outstanding. Cancel-safe:
    /// dropping the future before it resolves loses no delivery, so it can be
    /// raced against a deadline.
    pub async fn next_outcome(&mut self) -> Option<Result<Execution, LoadError>> {
        if let Ok(delivery) = self.rx.try_recv() {
            return Some(self.process(delivery));
        }
        if self.outstanding.is_empty() {
            return None;
        }
        // `self.tx` keeps the channel open, so `recv` only yields deliveries.
        let delivery = self.rx.recv().await?;
        Some(self.process(delivery))
    }

    fn process(&mut self, delivery: Delivery) -> Result<Execution, LoadError> {
        let Delivery {
            identifier,
            kind,
            url,
            result,
        } = delivery;
        self.outstanding.remove(&identifier);

        let body = match result {
            Ok(body) => body,
            Err(source) => {
                self.fail(&identifier);
                return Err(LoadError::Fetch { url, source });
            }
        };
        trace_phase(&identifier, LoadPhase::Received(kind));

        match kind {
            FetchKind::Diff => self.apply_payload(&identifier, &body),
            FetchKind::Full => {
                // A bootstrap at the current version: stage and execute,
                // never fetching again.
                self.pending.stage(identifier.clone(), body);
                self.apply_and_execute(&identifier, None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// `<diff_url><cache key>_<from>_<current>.diff`
    pub fn diff_url(
        &self,
        identifier: &ResourceId,
        from_version: &Version,
    ) -> Result<String, LoadError> {
        Ok(self.descriptor(identifier)?.diff_url(from_version))
    }

    /// Classify the cache state of `identifier` without loading it.
    pub fn freshness(&self, identifier: &ResourceId) -> Result<Freshness, LoadError> {
        let descriptor = self.descriptor(identifier)?;
        freshness::classify(&self.store, descriptor).map_err(|source| LoadError::Store {
            key: identifier.cache_key().to_string(),
            source,
        })
    }

    pub fn is_pending(&self, identifier: &ResourceId) -> bool {
        self.pending.contains(identifier)
    }

    pub fn pending_code(&self, identifier: &ResourceId) -> Option<&str> {
        self.pending.get(identifier)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of non-blocking fetches not yet completed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn into_parts(self) -> (F, S, E) {
        (self.fetcher, self.store, self.evaluator)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn descriptor(&self, identifier: &ResourceId) -> Result<&ResourceDescriptor, LoadError> {
        self.registry
            .get(identifier)
            .ok_or_else(|| LoadError::UnknownResource {
                identifier: identifier.clone(),
            })
    }

    /// A second request for an identifier already loading is rejected
    /// rather than overwriting the first one's staged code.
    fn ensure_idle(&self, identifier: &ResourceId) -> Result<(), LoadError> {
        if self.pending.contains(identifier) || self.outstanding.contains_key(identifier) {
            return Err(LoadError::AlreadyInFlight {
                identifier: identifier.clone(),
            });
        }
        Ok(())
    }

    /// Decode a fetched diff and hand it to `apply_and_execute`.
    fn apply_payload(
        &mut self,
        identifier: &ResourceId,
        body: &str,
    ) -> Result<Execution, LoadError> {
        match Diff::parse(body) {
            Ok(diff) => self.apply_and_execute(identifier, Some(&diff)),
            Err(err) => {
                self.fail(identifier);
                Err(err.into())
            }
        }
    }

    fn dispatch(&mut self, identifier: &ResourceId, kind: FetchKind, url: String) -> LoadOutcome {
        trace_phase(identifier, LoadPhase::Fetching(kind));
        self.outstanding.insert(identifier.clone(), kind);
        let completion = Completion::new(identifier.clone(), kind, url.clone(), self.tx.clone());
        self.fetcher.fetch_non_blocking(&url, completion);
        LoadOutcome::Fetching {
            identifier: identifier.clone(),
            url,
            kind,
        }
    }

    /// Release a load that failed before reaching `apply_and_execute`.
    fn fail(&mut self, identifier: &ResourceId) {
        self.pending.remove(identifier);
        tracing::warn!(%identifier, phase = %LoadPhase::Failed, "load abandoned");
    }
}

fn trace_phase(identifier: &ResourceId, phase: LoadPhase) {
    tracing::debug!(%identifier, %phase, "load phase");
}
