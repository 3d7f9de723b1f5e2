pub mod apply;
pub mod bootstrap;
pub mod evict;
pub mod load;
pub mod register;
pub mod resources;
pub mod status;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use diffable_core::{registry, Registry, ResourceId};
use diffable_loader::{
    CacheStore, Coordinator, Evaluator, Execution, Fetcher, FileCacheStore, LoadError, LoadOutcome,
};

use crate::host::{HostEvaluator, UrlFetcher};

pub type HostCoordinator = Coordinator<UrlFetcher, FileCacheStore, HostEvaluator>;

/// Evaluation and wait options shared by `load` and `bootstrap`.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Pipe each resource to this program's stdin instead of printing it
    /// (e.g. "node" or "sh -s").
    #[arg(long, value_name = "PROGRAM")]
    pub exec: Option<String>,

    /// Give up on outstanding fetches after this many seconds.
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout_secs: u64,
}

pub fn resolve_home(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) => Ok(home),
        None => dirs::home_dir().context("could not determine home directory"),
    }
}

pub fn load_registry(home: &Path) -> Result<Registry> {
    registry::load_at(home)
        .context("failed to load resource registry: run `diffable register` first")
}

pub fn open_coordinator(home: &Path, exec: &ExecArgs) -> Result<HostCoordinator> {
    let registry = load_registry(home)?;
    let evaluator = match exec.exec.as_deref() {
        Some(command) => HostEvaluator::command(command)?,
        None => HostEvaluator::Stdout,
    };
    Ok(Coordinator::new(
        registry,
        UrlFetcher::new(),
        FileCacheStore::at(home),
        evaluator,
    ))
}

/// Tracks per-resource results of one command invocation.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub executed: usize,
    pub failed: usize,
}

impl LoadReport {
    pub fn record_request(
        &mut self,
        identifier: &ResourceId,
        result: Result<LoadOutcome, LoadError>,
    ) {
        match result {
            Ok(LoadOutcome::Executed(execution)) => self.record(Ok(execution)),
            Ok(LoadOutcome::Fetching { url, kind, .. }) => {
                tracing::info!(%identifier, %url, %kind, "fetch issued");
            }
            Err(err) => {
                eprintln!("✗ {identifier}: {err}");
                self.failed += 1;
            }
        }
    }

    pub fn record(&mut self, result: Result<Execution, LoadError>) {
        match result {
            Ok(execution) => {
                eprintln!("{}", describe(&execution));
                self.executed += 1;
            }
            Err(err) => {
                eprintln!("✗ {err}");
                self.failed += 1;
            }
        }
    }

    /// Wait for outstanding fetches of `coordinator`, recording each result
    /// as it arrives. Results delivered before the deadline are kept even
    /// when it is missed.
    pub fn settle<F, S, E>(
        &mut self,
        coordinator: &mut Coordinator<F, S, E>,
        timeout_secs: u64,
    ) -> Result<()>
    where
        F: Fetcher,
        S: CacheStore,
        E: Evaluator,
    {
        if coordinator.outstanding() == 0 {
            return Ok(());
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to start async runtime")?;
        let timeout = Duration::from_secs(timeout_secs);
        runtime.block_on(async {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                match tokio::time::timeout_at(deadline, coordinator.next_outcome()).await {
                    Ok(Some(result)) => self.record(result),
                    Ok(None) => return Ok(()),
                    Err(_) => break,
                }
            }
            for result in coordinator.pump() {
                self.record(result);
            }
            anyhow::bail!(
                "timed out after {timeout_secs}s with {} fetch(es) outstanding",
                coordinator.outstanding()
            )
        })
    }

    pub fn finish(self) -> Result<()> {
        if self.failed > 0 {
            anyhow::bail!(
                "{} of {} resource(s) failed to load",
                self.failed,
                self.failed + self.executed
            );
        }
        Ok(())
    }
}

fn describe(execution: &Execution) -> String {
    let mut notes = Vec::new();
    if execution.patched {
        notes.push("patched");
    }
    if execution.cached {
        notes.push("cached");
    }
    let notes = if notes.is_empty() {
        String::new()
    } else {
        format!(" ({})", notes.join(", "))
    };
    format!(
        "✓ '{}' executed at {}{notes}",
        execution.identifier, execution.version
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use diffable_core::ResourceDescriptor;
    use diffable_loader::{CollaboratorError, Completion, MemoryCacheStore};

    /// Resolves `ready` inline; parks everything else.
    struct SplitFetcher {
        ready: String,
        parked: Arc<Mutex<Vec<Completion>>>,
    }

    impl Fetcher for SplitFetcher {
        fn fetch_blocking(&mut self, url: &str) -> Result<String, CollaboratorError> {
            Err(format!("unexpected blocking fetch of {url}").into())
        }

        fn fetch_non_blocking(&mut self, url: &str, completion: Completion) {
            if url == self.ready {
                completion.succeed("ready()");
            } else {
                self.parked.lock().unwrap().push(completion);
            }
        }
    }

    struct Discard;

    impl Evaluator for Discard {
        fn evaluate_in_global_scope(&mut self, _source: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    #[test]
    fn timeout_still_counts_resources_that_executed() {
        let registry: Registry = [
            ResourceDescriptor::new("fast", "/d/", "v1"),
            ResourceDescriptor::new("slow", "/d/", "v1"),
        ]
        .into_iter()
        .collect();
        let fetcher = SplitFetcher {
            ready: "/d/fast".to_string(),
            parked: Arc::default(),
        };
        let mut coordinator =
            Coordinator::new(registry, fetcher, MemoryCacheStore::new(), Discard);

        let mut report = LoadReport::default();
        for id in ["fast", "slow"] {
            let id = ResourceId::from(id);
            let result = coordinator.request_by_cache(&id);
            report.record_request(&id, result);
        }

        let err = report.settle(&mut coordinator, 1).unwrap_err();
        assert!(err.to_string().contains("1 fetch(es) outstanding"), "{err}");
        assert_eq!(report.executed, 1);
        assert_eq!(report.failed, 0);
    }
}
