//! `diffable load <id>...`: load resources through the cache.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use diffable_core::ResourceId;

use super::{ExecArgs, LoadReport};

/// Load resources through the cache and execute them.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Identifiers of registered resources, loaded in order.
    #[arg(required = true, num_args = 1..)]
    pub identifiers: Vec<String>,

    #[command(flatten)]
    pub exec: ExecArgs,
}

impl LoadArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let mut coordinator = super::open_coordinator(home, &self.exec)?;
        let mut report = LoadReport::default();

        for raw in &self.identifiers {
            let identifier = ResourceId::from(raw.as_str());
            let result = coordinator.request_by_cache(&identifier);
            report.record_request(&identifier, result);
        }
        report.settle(&mut coordinator, self.exec.timeout_secs)?;
        report.finish()
    }
}
