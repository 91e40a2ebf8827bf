//! Automation engine abstraction.
//!
//! The [`Engine`] trait decouples step orchestration from the engine backend
//! (currently `ansible-playbook`). An engine hands out one [`EngineContext`]
//! per step; [`ContextGuard`] owns it and releases it on every exit path.
//! Tests use scripted engines that replay predetermined host events.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;
use tracing::{debug, info, instrument, trace, warn};

use crate::core::collector::ResultSink;
use crate::core::credentials::BecomePassword;
use crate::core::options::ExecutionOptions;
use crate::core::step::ModuleArgs;
use crate::io::config::RunnerConfig;
use crate::io::process::run_command;

/// Ephemeral single-task play: one module invocation against a host pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Play {
    /// Host pattern the play targets.
    pub hosts: String,
    pub module: String,
    pub args: Option<ModuleArgs>,
    /// Hosts per batch.
    pub serial: u32,
    /// Task error policy forwarded to the result sink.
    pub ignore_errors: bool,
}

impl Play {
    /// Playbook document the engine loads. JSON is valid YAML.
    ///
    /// Fact gathering is always off.
    pub fn to_document(&self) -> Value {
        let mut task = serde_json::Map::new();
        task.insert("name".to_string(), Value::String(self.module.clone()));
        task.insert(
            self.module.clone(),
            self.args.as_ref().map(ModuleArgs::to_value).unwrap_or(Value::Null),
        );
        task.insert("ignore_errors".to_string(), Value::Bool(self.ignore_errors));

        json!([{
            "name": format!("playrunner: {}", self.module),
            "hosts": self.hosts,
            "gather_facts": false,
            "serial": self.serial,
            "tasks": [Value::Object(task)],
        }])
    }
}

/// Abstraction over automation engine backends.
pub trait Engine {
    type Context: EngineContext;

    /// Acquire an execution context for one step.
    fn open(
        &self,
        options: &ExecutionOptions,
        become_password: Option<&BecomePassword>,
    ) -> Result<Self::Context>;
}

/// Execution context for one step. Reports host events to `sink` while running.
pub trait EngineContext {
    fn run(&mut self, play: &Play, sink: &mut dyn ResultSink) -> Result<()>;

    /// Release everything the context holds. Must tolerate repeated calls.
    fn cleanup(&mut self);
}

/// Exclusive owner of an acquired context; cleans it up when dropped.
pub struct ContextGuard<C: EngineContext> {
    context: C,
}

impl<C: EngineContext> ContextGuard<C> {
    pub fn new(context: C) -> Self {
        Self { context }
    }

    pub fn run(&mut self, play: &Play, sink: &mut dyn ResultSink) -> Result<()> {
        self.context.run(play, sink)
    }
}

impl<C: EngineContext> Drop for ContextGuard<C> {
    fn drop(&mut self) {
        trace!("releasing execution context");
        self.context.cleanup();
    }
}

/// Engine that runs single-task plays through `ansible-playbook`.
#[derive(Debug, Clone)]
pub struct AnsibleEngine {
    program: String,
    inventory: String,
    output_limit_bytes: usize,
    timeout: Option<Duration>,
}

impl AnsibleEngine {
    pub fn new(program: impl Into<String>, inventory: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            inventory: inventory.into(),
            output_limit_bytes: 10_000_000,
            timeout: None,
        }
    }

    pub fn from_config(cfg: &RunnerConfig) -> Self {
        Self {
            program: cfg.engine.ansible_playbook.clone(),
            inventory: cfg.inventory.clone(),
            output_limit_bytes: cfg.engine.output_limit_bytes,
            timeout: cfg.engine.timeout(),
        }
    }
}

impl Engine for AnsibleEngine {
    type Context = AnsibleContext;

    #[instrument(skip_all, fields(sudo = options.become_enabled, check = options.check))]
    fn open(
        &self,
        options: &ExecutionOptions,
        become_password: Option<&BecomePassword>,
    ) -> Result<AnsibleContext> {
        let workdir = tempfile::Builder::new()
            .prefix("playrunner-")
            .tempdir()
            .context("create execution context dir")?;
        let password_file = match become_password {
            Some(password) => {
                let path = workdir.path().join("become_pass");
                write_secret_file(&path, password)?;
                Some(path)
            }
            None => None,
        };
        debug!(dir = %workdir.path().display(), "execution context acquired");
        Ok(AnsibleContext {
            engine: self.clone(),
            options: options.clone(),
            workdir: Some(workdir),
            password_file,
            plays_run: 0,
        })
    }
}

/// Scratch directory (generated plays, become password file) for one step.
#[derive(Debug)]
pub struct AnsibleContext {
    engine: AnsibleEngine,
    options: ExecutionOptions,
    workdir: Option<TempDir>,
    password_file: Option<PathBuf>,
    plays_run: u32,
}

impl EngineContext for AnsibleContext {
    #[instrument(skip_all, fields(hosts = %play.hosts, module = %play.module))]
    fn run(&mut self, play: &Play, sink: &mut dyn ResultSink) -> Result<()> {
        let workdir = self
            .workdir
            .as_ref()
            .ok_or_else(|| anyhow!("execution context already released"))?;
        self.plays_run += 1;
        let playbook_path = workdir.path().join(format!("play-{}.json", self.plays_run));
        let mut doc = serde_json::to_string_pretty(&play.to_document())?;
        doc.push('\n');
        fs::write(&playbook_path, doc)
            .with_context(|| format!("write play {}", playbook_path.display()))?;

        let args = build_playbook_args(
            &playbook_path,
            &self.engine.inventory,
            &self.options,
            self.password_file.as_deref(),
        );
        let mut cmd = Command::new(&self.engine.program);
        cmd.args(&args)
            .current_dir(workdir.path())
            .env("ANSIBLE_STDOUT_CALLBACK", "json")
            .env("ANSIBLE_NOCOLOR", "1")
            .env("ANSIBLE_RETRY_FILES_ENABLED", "false")
            .env("ANSIBLE_INVENTORY_UNPARSED_FAILED", "true");

        info!("starting ansible-playbook");
        let output = run_command(
            cmd,
            self.engine.timeout,
            self.engine.output_limit_bytes,
        )
        .context("run ansible-playbook")?;

        if output.timed_out {
            warn!("ansible-playbook timed out");
            return Err(anyhow!(
                "ansible-playbook timed out after {:?}",
                self.engine.timeout
            ));
        }
        // 2: a host failed; 3 or 4: a host was unreachable. All are reported per host.
        if !matches!(output.status.code(), Some(0 | 2 | 3 | 4)) {
            warn!(exit_code = ?output.status.code(), "ansible-playbook failed");
            return Err(anyhow!(
                "ansible-playbook failed with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(2_000)
            ));
        }

        let report = extract_json_report(&output.stdout_lossy())
            .context("parse ansible-playbook json report")?;
        let replayed = replay_report(&report, play.ignore_errors, sink)?;
        debug!(events = replayed, "ansible-playbook completed");
        Ok(())
    }

    fn cleanup(&mut self) {
        let Some(workdir) = self.workdir.take() else {
            return;
        };
        let path = workdir.path().to_path_buf();
        match workdir.close() {
            Ok(()) => debug!(dir = %path.display(), "execution context released"),
            Err(err) => warn!(dir = %path.display(), err = %err, "failed to remove context dir"),
        }
        self.password_file = None;
    }
}

/// Command-line arguments for one `ansible-playbook` invocation.
pub fn build_playbook_args(
    playbook: &Path,
    inventory: &str,
    options: &ExecutionOptions,
    password_file: Option<&Path>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        playbook.into(),
        "-i".into(),
        inventory.into(),
        "--forks".into(),
        options.forks.to_string().into(),
        "--connection".into(),
        options.connection.clone().into(),
    ];

    let optional = [
        ("--user", &options.remote_user),
        ("--private-key", &options.private_key_file),
        ("--module-path", &options.module_path),
        ("--ssh-common-args", &options.ssh_common_args),
        ("--ssh-extra-args", &options.ssh_extra_args),
        ("--sftp-extra-args", &options.sftp_extra_args),
        ("--scp-extra-args", &options.scp_extra_args),
    ];
    for (flag, value) in optional {
        if let Some(value) = value {
            args.push(flag.into());
            args.push(value.clone().into());
        }
    }

    if options.become_enabled {
        args.push("--become".into());
        args.push("--become-method".into());
        args.push(options.become_method.clone().into());
        args.push("--become-user".into());
        args.push(options.become_user.clone().into());
    }
    if let Some(path) = password_file {
        args.push("--become-password-file".into());
        args.push(path.into());
    }
    if options.check {
        args.push("--check".into());
    }
    if options.verbosity > 0 {
        args.push(format!("-{}", "v".repeat(usize::from(options.verbosity.min(6)))).into());
    }
    args
}

/// Locate the JSON report in engine stdout.
///
/// Verbose runs print diagnostics before the report, so try each line that
/// opens a top-level object until one parses through to the end.
pub fn extract_json_report(stdout: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        return Ok(value);
    }
    let mut offset = 0;
    for line in stdout.split_inclusive('\n') {
        if line.starts_with('{')
            && let Ok(value) = serde_json::from_str::<Value>(stdout[offset..].trim())
        {
            return Ok(value);
        }
        offset += line.len();
    }
    Err(anyhow!("no json report found in engine output"))
}

/// Feed per-host task results from a json-callback report into `sink`.
///
/// Returns the number of events delivered. Skipped hosts are not reported.
pub fn replay_report(report: &Value, ignore_errors: bool, sink: &mut dyn ResultSink) -> Result<usize> {
    let plays = report
        .get("plays")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("report is missing 'plays'"))?;

    let mut events = 0usize;
    for play in plays {
        let Some(tasks) = play.get("tasks").and_then(Value::as_array) else {
            continue;
        };
        for task in tasks {
            let Some(hosts) = task.get("hosts").and_then(Value::as_object) else {
                continue;
            };
            for (host, result) in hosts {
                if is_flag_set(result, "unreachable") {
                    sink.on_host_unreachable(host, result.clone());
                } else if is_flag_set(result, "failed") {
                    sink.on_host_failed(host, result.clone(), ignore_errors);
                } else if is_flag_set(result, "skipped") {
                    trace!(host = %host, "host skipped");
                    continue;
                } else {
                    sink.on_host_ok(host, result.clone());
                }
                events += 1;
            }
        }
    }
    Ok(events)
}

fn is_flag_set(result: &Value, key: &str) -> bool {
    matches!(result.get(key), Some(Value::Bool(true)))
}

#[cfg(unix)]
fn write_secret_file(path: &Path, password: &BecomePassword) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("create {}", path.display()))?;
    file.write_all(password.expose().as_bytes())
        .with_context(|| format!("write {}", path.display()))
}

#[cfg(not(unix))]
fn write_secret_file(path: &Path, password: &BecomePassword) -> Result<()> {
    let mut file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(password.expose().as_bytes())
        .with_context(|| format!("write {}", path.display()))
}
