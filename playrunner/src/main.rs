//! Sequential playbook runner.
//!
//! Runs a JSON playbook of single-module steps against an inventory through
//! `ansible-playbook`, stopping at the first step that fails on any host.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use playrunner::core::credentials::BecomePassword;
use playrunner::core::step::{ModuleArgs, PlaybookStep};
use playrunner::core::target::Target;
use playrunner::core::types::{Host, HostResults, failed_hosts};
use playrunner::exit_codes;
use playrunner::io::config::{RunnerConfig, config_path, load_config, write_config};
use playrunner::io::engine::AnsibleEngine;
use playrunner::io::inventory::{AnsibleInventory, InventoryResolver, effective_pattern};
use playrunner::io::playbook_file::load_playbook;
use playrunner::logging::{self, TracingLogger};
use playrunner::playbook::{PlaybookError, run_playbook};
use playrunner::step::{StepRequest, StepRunner};

#[derive(Parser)]
#[command(
    name = "playrunner",
    version,
    about = "Run playbooks of single-module steps, aborting on the first failed host"
)]
struct Cli {
    /// Config file (default: ./playrunner.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Inventory source, overriding the config file.
    #[arg(short, long, global = true, value_name = "SOURCE")]
    inventory: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a playbook file and print the execution log as JSON.
    Run {
        /// Playbook file (JSON array of steps).
        playbook: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        exec: ExecFlags,
    },
    /// Run one module against a target and print per-host results as JSON.
    Exec {
        /// Module name, e.g. `shell` or `ansible.builtin.copy`.
        module: String,
        /// Module arguments: free-form text, or a JSON object.
        #[arg(short, long)]
        args: Option<String>,
        /// Enable privilege escalation.
        #[arg(long)]
        sudo: bool,
        /// Do not record failed hosts.
        #[arg(long)]
        ignore_errors: bool,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        exec: ExecFlags,
    },
    /// List the hosts a pattern resolves to, one per line.
    Hosts {
        /// Host pattern (default: all).
        pattern: Option<String>,
    },
    /// Check a playbook file against the schema without running it.
    Validate {
        playbook: PathBuf,
    },
    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Host pattern (default: all).
    #[arg(short, long, conflicts_with = "hosts")]
    target: Option<String>,

    /// Explicit host; repeat for several.
    #[arg(long = "host", value_name = "HOST")]
    hosts: Vec<String>,
}

impl TargetArgs {
    fn to_target(&self) -> Target {
        if !self.hosts.is_empty() {
            return Target::Hosts(self.hosts.clone());
        }
        Target::Pattern(self.target.clone().unwrap_or_else(|| "all".to_string()))
    }
}

#[derive(Args, Debug, Default)]
struct ExecFlags {
    /// Dry run: ask modules to report changes without making them.
    #[arg(long)]
    check: bool,

    /// Engine verbosity; repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Read the become password from this environment variable.
    #[arg(long, value_name = "VAR")]
    become_password_env: Option<String>,
}

impl ExecFlags {
    fn apply(&self, cfg: &mut RunnerConfig) {
        if self.check {
            cfg.options.check = true;
        }
        if self.verbose > 0 {
            cfg.options.verbosity = self.verbose;
        }
    }

    fn become_password(&self) -> Result<Option<BecomePassword>> {
        let Some(var) = self.become_password_env.as_deref() else {
            return Ok(None);
        };
        let value = env::var(var).with_context(|| format!("read become password from ${var}"))?;
        Ok(Some(BecomePassword::new(value)))
    }
}

#[derive(Serialize)]
struct ExecOutput<'a> {
    contacted: &'a HostResults,
    unreachable: &'a BTreeMap<Host, Value>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = env::current_dir().context("resolve current directory")?;
    let path = config_path(cli.config.as_deref(), &cwd);
    let inventory = cli.inventory;
    match cli.command {
        Command::InitConfig { force } => cmd_init_config(&path, force),
        Command::Validate { playbook } => cmd_validate(&playbook),
        Command::Run {
            playbook,
            target,
            exec,
        } => cmd_run(
            load_runner_config(&path, inventory)?,
            &playbook,
            &target,
            &exec,
        ),
        Command::Exec {
            module,
            args,
            sudo,
            ignore_errors,
            target,
            exec,
        } => cmd_exec(
            load_runner_config(&path, inventory)?,
            &module,
            args.as_deref(),
            sudo,
            ignore_errors,
            &target,
            &exec,
        ),
        Command::Hosts { pattern } => {
            cmd_hosts(&load_runner_config(&path, inventory)?, pattern.as_deref())
        }
    }
}

/// Load config and apply the `--inventory` override.
fn load_runner_config(path: &Path, inventory: Option<String>) -> Result<RunnerConfig> {
    let mut cfg = load_config(path)?;
    if let Some(inventory) = inventory {
        cfg.inventory = inventory;
        cfg.validate()?;
    }
    Ok(cfg)
}

fn cmd_run(mut cfg: RunnerConfig, playbook: &Path, target: &TargetArgs, exec: &ExecFlags) -> Result<i32> {
    exec.apply(&mut cfg);
    let playbook = load_playbook(playbook)?;
    let become_password = exec.become_password()?;
    let inventory = AnsibleInventory::from_config(&cfg);
    let runner = StepRunner::new(AnsibleEngine::from_config(&cfg), cfg.options.clone());

    match run_playbook(
        &runner,
        &inventory,
        &target.to_target(),
        &playbook,
        become_password.as_ref(),
        Some(&TracingLogger),
    ) {
        Ok(log) => {
            print_json(&log)?;
            Ok(exit_codes::OK)
        }
        Err(PlaybookError::Aborted(report)) => {
            print_json(&report)?;
            eprintln!(
                "aborted at step {} ({}): failed on {}",
                report.step_index,
                report.module,
                report.failed_hosts().join(", ")
            );
            Ok(exit_codes::ABORTED)
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_exec(
    mut cfg: RunnerConfig,
    module: &str,
    args: Option<&str>,
    sudo: bool,
    ignore_errors: bool,
    target: &TargetArgs,
    exec: &ExecFlags,
) -> Result<i32> {
    exec.apply(&mut cfg);
    let become_password = exec.become_password()?;
    let step = PlaybookStep::new(module)?
        .with_params(args.map(parse_module_args))
        .with_sudo(sudo)
        .with_ignore_errors(ignore_errors);
    let pattern = exec_pattern(target);
    let runner = StepRunner::new(AnsibleEngine::from_config(&cfg), cfg.options.clone());

    let request = StepRequest::for_step(&pattern, &step, become_password.as_ref());
    let collector = runner.run_collect(&request)?;
    print_json(&ExecOutput {
        contacted: collector.contacted(),
        unreachable: collector.unreachable(),
    })?;
    if failed_hosts(collector.contacted()).is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::ABORTED)
    }
}

/// Engine pattern for an ad hoc step; an empty target means all hosts.
fn exec_pattern(target: &TargetArgs) -> String {
    effective_pattern(Some(&target.to_target().to_pattern())).to_string()
}

fn cmd_hosts(cfg: &RunnerConfig, pattern: Option<&str>) -> Result<i32> {
    let inventory = AnsibleInventory::from_config(cfg);
    for host in inventory.resolve(pattern)? {
        println!("{host}");
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let playbook = load_playbook(path)?;
    println!(
        "ok: {} steps ({} entries)",
        playbook.step_count(),
        playbook.entries().len()
    );
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &RunnerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// Module arguments from the command line: a JSON object when it parses as
/// one, free-form text otherwise.
fn parse_module_args(raw: &str) -> ModuleArgs {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => ModuleArgs::Structured(map),
        _ => ModuleArgs::Free(raw.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
