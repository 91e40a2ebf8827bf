//! Host pattern resolution against an external inventory source.
//!
//! The inventory format belongs to the engine. We only ask it which hosts a
//! pattern matches (`ansible <pattern> --list-hosts`) and keep its order.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::types::Host;
use crate::io::config::RunnerConfig;
use crate::io::process::run_command;

/// Pattern used when none is given.
pub const ALL_HOSTS: &str = "all";

/// Resolves a host pattern into concrete hosts.
pub trait InventoryResolver {
    /// Return every host `pattern` matches, in the source's enumeration order.
    ///
    /// `None` or an empty pattern means all hosts. Errors when the backing
    /// source cannot be read or parsed.
    fn resolve(&self, pattern: Option<&str>) -> Result<Vec<Host>>;
}

/// Normalize an optional pattern, defaulting to [`ALL_HOSTS`].
pub fn effective_pattern(pattern: Option<&str>) -> &str {
    match pattern.map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => ALL_HOSTS,
    }
}

/// Inventory resolver backed by the `ansible` CLI.
#[derive(Debug, Clone)]
pub struct AnsibleInventory {
    program: String,
    source: String,
    output_limit_bytes: usize,
    timeout: Option<Duration>,
}

impl AnsibleInventory {
    pub fn new(program: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            source: source.into(),
            output_limit_bytes: 1_000_000,
            timeout: None,
        }
    }

    pub fn from_config(cfg: &RunnerConfig) -> Self {
        Self {
            program: cfg.engine.ansible.clone(),
            source: cfg.inventory.clone(),
            output_limit_bytes: cfg.engine.output_limit_bytes,
            timeout: cfg.engine.timeout(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl InventoryResolver for AnsibleInventory {
    #[instrument(skip_all, fields(source = %self.source))]
    fn resolve(&self, pattern: Option<&str>) -> Result<Vec<Host>> {
        let pattern = effective_pattern(pattern);
        let mut cmd = Command::new(&self.program);
        cmd.arg(pattern)
            .arg("-i")
            .arg(&self.source)
            .arg("--list-hosts")
            // Turn "could not parse inventory" warnings into a failing exit.
            .env("ANSIBLE_INVENTORY_UNPARSED_FAILED", "true")
            .env("ANSIBLE_NOCOLOR", "1");

        let output = run_command(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("resolve pattern '{pattern}'"))?;
        if output.timed_out {
            return Err(anyhow!("inventory resolution timed out for '{pattern}'"));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "inventory resolution failed");
            return Err(anyhow!(
                "inventory {} could not be resolved (exit {:?}): {}",
                self.source,
                output.status.code(),
                output.stderr_tail(2_000)
            ));
        }

        let hosts = parse_list_hosts(&output.stdout_lossy())
            .with_context(|| format!("parse host list from inventory {}", self.source))?;
        debug!(pattern, count = hosts.len(), "pattern resolved");
        Ok(hosts)
    }
}

static HOSTS_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*hosts \((\d+)\):\s*$").unwrap());

/// Parse `--list-hosts` output:
///
/// ```text
///   hosts (2):
///     web1
///     web2
/// ```
///
/// Lines before the header are ignored. The listed count must match the header.
pub fn parse_list_hosts(stdout: &str) -> Result<Vec<Host>> {
    let mut lines = stdout.lines();
    let expected = loop {
        let line = lines
            .next()
            .ok_or_else(|| anyhow!("missing 'hosts (N):' header"))?;
        if let Some(caps) = HOSTS_HEADER_RE.captures(line) {
            break caps[1]
                .parse::<usize>()
                .context("parse host count")?;
        }
    };

    let hosts: Vec<Host> = lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if hosts.len() != expected {
        return Err(anyhow!(
            "host list is malformed: header says {expected}, found {}",
            hosts.len()
        ));
    }
    Ok(hosts)
}
