//! `diffable apply <base-file> <diff-file>`: offline patch application.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use diffable_core::{Diff, ResourceId};

/// Apply a diff file to a base file and print the result.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Previously cached code.
    pub base: PathBuf,

    /// JSON instruction stream.
    pub diff: PathBuf,

    /// Identifier used in error messages.
    #[arg(long = "id", value_name = "ID", default_value = "resource")]
    pub identifier: String,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let base = std::fs::read_to_string(&self.base)
            .with_context(|| format!("cannot read base '{}'", self.base.display()))?;
        let payload = std::fs::read_to_string(&self.diff)
            .with_context(|| format!("cannot read diff '{}'", self.diff.display()))?;

        let diff = Diff::parse(&payload)
            .with_context(|| format!("malformed diff '{}'", self.diff.display()))?;
        let patched = diff
            .apply(&ResourceId::from(self.identifier), &base)
            .with_context(|| format!("cannot apply '{}'", self.diff.display()))?;

        print!("{patched}");
        Ok(())
    }
}
