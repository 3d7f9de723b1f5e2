//! `diffable status`: cache freshness per registered resource.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use diffable_core::ResourceDescriptor;
use diffable_loader::{
    freshness::{self, format_datetime_age},
    FileCacheStore, Freshness,
};

/// Arguments for `diffable status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let registry = super::load_registry(home)?;
        let store = FileCacheStore::at(home);

        let mut rows = Vec::new();
        for descriptor in &registry.resources {
            let signal = freshness::classify(&store, descriptor)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("status check failed for '{}'", descriptor.identifier))?;
            rows.push(ResourceStatus::new(descriptor, signal));
        }

        if self.json {
            return print_json(rows);
        }
        print_table(rows);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ResourceStatus {
    identifier: String,
    cache_key: String,
    current_version: String,
    signal: Freshness,
}

impl ResourceStatus {
    fn new(descriptor: &ResourceDescriptor, signal: Freshness) -> Self {
        Self {
            identifier: descriptor.identifier.to_string(),
            cache_key: descriptor.identifier.cache_key().to_string(),
            current_version: descriptor.current_version.to_string(),
            signal,
        }
    }

    fn cached_version(&self) -> Option<String> {
        match &self.signal {
            Freshness::Stale { cached_version, .. } => Some(cached_version.to_string()),
            Freshness::Current { .. } => Some(self.current_version.clone()),
            Freshness::Uncacheable | Freshness::Miss => None,
        }
    }

    fn age(&self) -> String {
        self.signal
            .stored_at()
            .map(format_datetime_age)
            .unwrap_or_else(|| "never".to_string())
    }
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    resources: Vec<ResourceStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    resources: usize,
    current: usize,
    stale: usize,
    missing: usize,
}

#[derive(Serialize)]
struct ResourceStatusJson {
    identifier: String,
    cache_key: String,
    current_version: String,
    status: String,
    cached_version: Option<String>,
    stored_at: Option<String>,
    age: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "resource")]
    identifier: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "current")]
    current_version: String,
    #[tabled(rename = "cached")]
    cached_version: String,
    #[tabled(rename = "age")]
    age: String,
}

fn count(rows: &[ResourceStatus], key: &str) -> usize {
    rows.iter().filter(|r| r.signal.key() == key).count()
}

fn print_json(rows: Vec<ResourceStatus>) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            resources: rows.len(),
            current: count(&rows, "current"),
            stale: count(&rows, "stale"),
            missing: count(&rows, "miss"),
        },
        resources: rows
            .into_iter()
            .map(|row| ResourceStatusJson {
                status: row.signal.key().to_string(),
                cached_version: row.cached_version(),
                stored_at: row
                    .signal
                    .stored_at()
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                age: row.age(),
                identifier: row.identifier,
                cache_key: row.cache_key,
                current_version: row.current_version,
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(rows: Vec<ResourceStatus>) {
    println!(
        "Diffable v{} | {} resources | {} current | {} stale",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        count(&rows, "current"),
        count(&rows, "stale"),
    );

    if rows.is_empty() {
        println!("No resources registered.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    println!(
        "Indicators: {} CURRENT  {} STALE  {} MISS  {} UNCACHEABLE",
        signal_indicator(&Freshness::Current { stored_at: None }),
        signal_indicator(&Freshness::Stale {
            cached_version: "".into(),
            stored_at: None,
        }),
        signal_indicator(&Freshness::Miss),
        signal_indicator(&Freshness::Uncacheable),
    );
    println!("{separator}");

    let needs_fetch = rows
        .iter()
        .any(|r| !matches!(r.signal, Freshness::Current { .. }));
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            status: signal_label(&row.signal).to_string(),
            cached_version: row.cached_version().unwrap_or_else(|| "-".to_string()),
            age: row.age(),
            identifier: row.identifier,
            current_version: row.current_version,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if needs_fetch {
        println!("Run 'diffable load <id>...' to fetch stale or missing resources.");
    }
}

fn signal_label(signal: &Freshness) -> &'static str {
    match signal {
        Freshness::Uncacheable => "UNCACHEABLE",
        Freshness::Miss => "MISS",
        Freshness::Stale { .. } => "STALE",
        Freshness::Current { .. } => "CURRENT",
    }
}

fn signal_indicator(signal: &Freshness) -> String {
    match signal {
        Freshness::Uncacheable => "■".bright_black().bold().to_string(),
        Freshness::Miss => "■".red().bold().to_string(),
        Freshness::Stale { .. } => "■".yellow().bold().to_string(),
        Freshness::Current { .. } => "■".green().bold().to_string(),
    }
}
