//! Runner configuration stored in `playrunner.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::options::ExecutionOptions;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "playrunner.toml";

/// Runner configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values the engine adapter has always used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Inventory source handed to the engine (`-i`).
    pub inventory: String,

    /// Run-level defaults for every step's execution options.
    pub options: ExecutionOptions,

    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Program used to execute single-task plays.
    pub ansible_playbook: String,

    /// Program used to resolve host patterns (`--list-hosts`).
    pub ansible: String,

    /// Truncate engine stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Kill the engine after this many seconds. Unset means wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ansible_playbook: "ansible-playbook".to_string(),
            ansible: "ansible".to_string(),
            output_limit_bytes: 10_000_000,
            timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            inventory: "hosts.txt".to_string(),
            options: ExecutionOptions::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inventory.trim().is_empty() {
            return Err(anyhow!("inventory must not be empty"));
        }
        self.options.validate().context("invalid [options]")?;
        if self.engine.ansible_playbook.trim().is_empty() {
            return Err(anyhow!("engine.ansible_playbook must not be empty"));
        }
        if self.engine.ansible.trim().is_empty() {
            return Err(anyhow!("engine.ansible must not be empty"));
        }
        if self.engine.output_limit_bytes == 0 {
            return Err(anyhow!("engine.output_limit_bytes must be > 0"));
        }
        if self.engine.timeout_secs == Some(0) {
            return Err(anyhow!("engine.timeout_secs must be > 0 when set"));
        }
        Ok(())
    }
}

/// Resolve the config path: an explicit path, or `playrunner.toml` in `cwd`.
pub fn config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILE))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
