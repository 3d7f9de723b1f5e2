//! Diffable: cache-aware, diff-patched resource loading CLI.
//!
//! # Usage
//!
//! ```text
//! diffable register <id> --diff-url <url> --version <v> [--sync] [--resource-url <url>]
//! diffable unregister <id>
//! diffable resources
//! diffable apply <base-file> <diff-file> [--id <id>]
//! diffable load <id>... [--exec <program>] [--timeout-secs <n>]
//! diffable bootstrap <id> <code-file> --version <v> [--exec <program>]
//! diffable status [--json]
//! diffable evict <id> | --all
//! ```
//!
//! Every command takes `--home <dir>` in place of the user's home directory.

mod commands;
mod host;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    apply::ApplyArgs,
    bootstrap::BootstrapArgs,
    evict::EvictArgs,
    load::LoadArgs,
    register::{RegisterArgs, UnregisterArgs},
    resources::ResourcesArgs,
    status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "diffable",
    version,
    about = "Load versioned resources through a local cache, fetching only diffs",
    long_about = None,
)]
struct Cli {
    /// Directory holding `.diffable/` (defaults to the home directory).
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish or update a resource descriptor.
    Register(RegisterArgs),

    /// Remove a resource descriptor.
    Unregister(UnregisterArgs),

    /// List published resource descriptors.
    Resources(ResourcesArgs),

    /// Apply a diff file to a base file and print the result.
    Apply(ApplyArgs),

    /// Load resources through the cache and execute them.
    Load(LoadArgs),

    /// Execute inline code delivered at a known version.
    Bootstrap(BootstrapArgs),

    /// Show cache freshness of every registered resource.
    Status(StatusArgs),

    /// Drop cached resource bodies.
    Evict(EvictArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let home = commands::resolve_home(cli.home)?;
    match cli.command {
        Commands::Register(args) => args.run(&home),
        Commands::Unregister(args) => args.run(&home),
        Commands::Resources(args) => args.run(&home),
        Commands::Apply(args) => args.run(),
        Commands::Load(args) => args.run(&home),
        Commands::Bootstrap(args) => args.run(&home),
        Commands::Status(args) => args.run(&home),
        Commands::Evict(args) => args.run(&home),
    }
}

/// Log to stderr; stdout carries evaluated output.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
