//! Host collaborators for the CLI: URL transport and evaluators.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Result;

use diffable_loader::{CollaboratorError, Completion, Evaluator, Fetcher};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Fetches `http(s)://` URLs with `ureq`; `file://` URLs and bare paths are
/// read from disk. Non-blocking fetches run on their own thread.
#[derive(Clone)]
pub struct UrlFetcher {
    agent: ureq::Agent,
}

impl UrlFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self { agent }
    }
}

impl Default for UrlFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for UrlFetcher {
    fn fetch_blocking(&mut self, url: &str) -> Result<String, CollaboratorError> {
        read_url(&self.agent, url)
    }

    fn fetch_non_blocking(&mut self, url: &str, completion: Completion) {
        let agent = self.agent.clone();
        let url = url.to_string();
        std::thread::spawn(move || completion.complete(read_url(&agent, &url)));
    }
}

fn read_url(agent: &ureq::Agent, url: &str) -> Result<String, CollaboratorError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        tracing::debug!(url, "GET");
        let response = agent
            .get(url)
            .call()
            .map_err(|e| format!("GET {url}: {e}"))?;
        return Ok(response.into_string()?);
    }
    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    tracing::debug!(path = %path.display(), "read");
    std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()).into())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Where executed source goes.
#[derive(Debug)]
pub enum HostEvaluator {
    /// Print it to stdout.
    Stdout,
    /// Pipe it to a program's stdin, one process per resource.
    Command { program: String, args: Vec<String> },
}

impl HostEvaluator {
    /// Parse a whitespace-separated command line such as `"sh -s"`.
    pub fn command(command_line: &str) -> Result<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| anyhow::anyhow!("--exec needs a program name"))?;
        Ok(HostEvaluator::Command {
            program,
            args: words.collect(),
        })
    }
}

impl Evaluator for HostEvaluator {
    fn evaluate_in_global_scope(&mut self, source: &str) -> Result<(), CollaboratorError> {
        match self {
            HostEvaluator::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(source.as_bytes())?;
                if !source.ends_with('\n') {
                    stdout.write_all(b"\n")?;
                }
                stdout.flush()?;
                Ok(())
            }
            HostEvaluator::Command { program, args } => run_program(program, args, source),
        }
    }
}

fn run_program(program: &str, args: &[String], source: &str) -> Result<(), CollaboratorError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to start '{program}': {e}"))?;
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(source.as_bytes()),
        None => Ok(()),
    };
    // Reap the child before reporting a broken pipe.
    let status = child.wait()?;
    written.map_err(|e| format!("failed to write to '{program}': {e}"))?;
    if !status.success() {
        return Err(format!("'{program}' exited with {status}").into());
    }
    Ok(())
}
