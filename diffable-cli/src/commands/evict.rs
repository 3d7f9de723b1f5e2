//! `diffable evict <id>` / `diffable evict --all`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use diffable_core::ResourceId;
use diffable_loader::FileCacheStore;

/// Drop cached resource bodies.
#[derive(Args, Debug)]
pub struct EvictArgs {
    /// Resource whose cache record to drop (omit when using `--all`).
    pub identifier: Option<String>,

    /// Drop every cache record.
    #[arg(long, conflicts_with = "identifier")]
    pub all: bool,
}

impl EvictArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let store = FileCacheStore::at(home);

        let keys = if self.all {
            store.list().context("failed to list cache records")?
        } else {
            let identifier = self
                .identifier
                .map(ResourceId::from)
                .context("provide a resource identifier or use --all")?;
            vec![identifier.cache_key().to_string()]
        };

        let mut removed = 0;
        for key in &keys {
            let existed = store
                .delete(key)
                .with_context(|| format!("failed to evict '{key}'"))?;
            if existed {
                removed += 1;
                println!("  ✗  {key}");
            }
        }
        println!("✓ Evicted {removed} cache record(s)");
        Ok(())
    }
}
