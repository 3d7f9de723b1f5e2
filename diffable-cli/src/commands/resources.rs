//! `diffable resources`

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

/// List published resource descriptors.
#[derive(Args, Debug)]
pub struct ResourcesArgs {}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "resource")]
    identifier: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "sync")]
    sync: &'static str,
    #[tabled(rename = "diff url")]
    diff_url: String,
    #[tabled(rename = "resource url")]
    resource_url: String,
}

impl ResourcesArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let registry = super::load_registry(home)?;
        if registry.resources.is_empty() {
            println!("No resources registered.");
            println!("Run: diffable register <id> --diff-url <url> --version <v>");
            return Ok(());
        }

        let rows: Vec<ResourceRow> = registry
            .resources
            .iter()
            .map(|d| ResourceRow {
                identifier: d.identifier.to_string(),
                version: d.current_version.to_string(),
                sync: if d.synchronous { "yes" } else { "no" },
                diff_url: d.diff_base_url.clone(),
                resource_url: d.resource_url(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
