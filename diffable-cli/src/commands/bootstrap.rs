//! `diffable bootstrap <id> <code-file> --version <v>`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use diffable_core::{ResourceId, Version};

use super::{ExecArgs, LoadReport};

/// Execute inline code delivered at a known version, patching it up to the
/// current version first if needed.
#[derive(Args, Debug)]
pub struct BootstrapArgs {
    pub identifier: String,

    /// File holding the delivered code.
    pub code: PathBuf,

    /// Version of the delivered code.
    #[arg(long = "version", value_name = "VERSION")]
    pub version: String,

    #[command(flatten)]
    pub exec: ExecArgs,
}

impl BootstrapArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let code = std::fs::read_to_string(&self.code)
            .with_context(|| format!("cannot read code '{}'", self.code.display()))?;
        let identifier = ResourceId::from(self.identifier);
        let version = Version::from(self.version);

        let mut coordinator = super::open_coordinator(home, &self.exec)?;
        let mut report = LoadReport::default();
        let result = coordinator.bootstrap(&identifier, code, &version);
        report.record_request(&identifier, result);
        report.settle(&mut coordinator, self.exec.timeout_secs)?;
        report.finish()
    }
}
