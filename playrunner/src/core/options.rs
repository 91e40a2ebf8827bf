//! Connection and privilege-escalation policy for one engine execution.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Immutable configuration bundle handed to the engine for one step.
///
/// Run-level defaults come from `playrunner.toml` (`[options]`); the only
/// per-step override is privilege escalation (`sudo` in the playbook).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Transport mode (`smart`, `ssh`, `local`, ...).
    pub connection: String,
    /// Extra module search path.
    pub module_path: Option<String>,
    /// Max hosts contacted concurrently within one step.
    pub forks: u32,
    pub remote_user: Option<String>,
    pub private_key_file: Option<String>,
    pub ssh_common_args: Option<String>,
    pub ssh_extra_args: Option<String>,
    pub sftp_extra_args: Option<String>,
    pub scp_extra_args: Option<String>,
    /// Privilege escalation enabled.
    #[serde(rename = "become")]
    pub become_enabled: bool,
    pub become_method: String,
    pub become_user: String,
    /// Dry run only.
    pub check: bool,
    /// Engine diagnostic level (number of `-v` flags).
    pub verbosity: u8,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            connection: "smart".to_string(),
            module_path: None,
            forks: 100,
            remote_user: None,
            private_key_file: None,
            ssh_common_args: None,
            ssh_extra_args: None,
            sftp_extra_args: None,
            scp_extra_args: None,
            become_enabled: false,
            become_method: "sudo".to_string(),
            become_user: "root".to_string(),
            check: false,
            verbosity: 3,
        }
    }
}

impl ExecutionOptions {
    /// Build the options for one step from run-level defaults.
    pub fn for_step(defaults: &ExecutionOptions, sudo: bool) -> Self {
        Self {
            become_enabled: sudo,
            ..defaults.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.forks == 0 {
            return Err(anyhow!("forks must be > 0"));
        }
        if self.connection.trim().is_empty() {
            return Err(anyhow!("connection must not be empty"));
        }
        if self.become_method.trim().is_empty() {
            return Err(anyhow!("become_method must not be empty"));
        }
        if self.become_user.trim().is_empty() {
            return Err(anyhow!("become_user must not be empty"));
        }
        Ok(())
    }
}
