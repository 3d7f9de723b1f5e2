//! `diffable register` and `diffable unregister`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use diffable_core::{registry, ResourceDescriptor, ResourceId};

/// Publish or update a resource descriptor.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Resource identifier, usually its content hash.
    pub identifier: String,

    /// Prefix that `<id>_<from>_<to>.diff` names are appended to.
    #[arg(long, value_name = "URL")]
    pub diff_url: String,

    /// Version currently published for the resource.
    #[arg(long = "version", value_name = "VERSION")]
    pub current_version: String,

    /// Fetch diffs with a blocking request during `bootstrap`.
    #[arg(long)]
    pub sync: bool,

    /// Location of the full resource (defaults to `<diff-url><id>`).
    #[arg(long, value_name = "URL")]
    pub resource_url: Option<String>,
}

impl RegisterArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let mut descriptor =
            ResourceDescriptor::new(self.identifier, self.diff_url, self.current_version)
                .synchronous(self.sync);
        descriptor.resource_url = self.resource_url;

        let identifier = descriptor.identifier.clone();
        let version = descriptor.current_version.clone();
        let registry = registry::register_at(home, descriptor)
            .with_context(|| format!("failed to register '{identifier}'"))?;

        println!("✓ Registered '{identifier}' at version {version}");
        println!(
            "  Saved to: {} ({} resource(s))",
            registry::registry_path_at(home).display(),
            registry.resources.len()
        );
        Ok(())
    }
}

/// Remove a resource descriptor. Its cache record is kept.
#[derive(Args, Debug)]
pub struct UnregisterArgs {
    pub identifier: String,
}

impl UnregisterArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let identifier = ResourceId::from(self.identifier);
        let removed = registry::unregister_at(home, &identifier)
            .with_context(|| format!("failed to unregister '{identifier}'"))?;
        match removed {
            Some(_) => println!("✓ Unregistered '{identifier}'"),
            None => anyhow::bail!("resource '{identifier}' is not registered"),
        }
        Ok(())
    }
}
