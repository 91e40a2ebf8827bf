//! Single-step execution: one module against one host pattern.

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::collector::ResultCollector;
use crate::core::credentials::BecomePassword;
use crate::core::options::ExecutionOptions;
use crate::core::step::{ModuleArgs, PlaybookStep};
use crate::core::types::HostResults;
use crate::io::engine::{ContextGuard, Engine, Play};

/// Parameters for one step invocation.
#[derive(Debug, Clone, Copy)]
pub struct StepRequest<'a> {
    /// Host pattern the step targets.
    pub pattern: &'a str,
    pub module: &'a str,
    pub args: Option<&'a ModuleArgs>,
    /// Enable privilege escalation for this step.
    pub sudo: bool,
    pub ignore_errors: bool,
    pub become_password: Option<&'a BecomePassword>,
}

impl<'a> StepRequest<'a> {
    pub fn new(pattern: &'a str, module: &'a str) -> Self {
        Self {
            pattern,
            module,
            args: None,
            sudo: false,
            ignore_errors: false,
            become_password: None,
        }
    }

    /// Request running a playbook step against `pattern`.
    pub fn for_step(
        pattern: &'a str,
        step: &'a PlaybookStep,
        become_password: Option<&'a BecomePassword>,
    ) -> Self {
        Self {
            pattern,
            module: step.module(),
            args: step.params(),
            sudo: step.sudo(),
            ignore_errors: step.ignore_errors(),
            become_password,
        }
    }
}

/// Runs single-task plays through an [`Engine`] with run-level option defaults.
#[derive(Debug, Clone)]
pub struct StepRunner<E: Engine> {
    engine: E,
    defaults: ExecutionOptions,
}

impl<E: Engine> StepRunner<E> {
    pub fn new(engine: E, defaults: ExecutionOptions) -> Self {
        Self { engine, defaults }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn defaults(&self) -> &ExecutionOptions {
        &self.defaults
    }

    /// Run one step and return the success/failure mapping of contacted hosts.
    ///
    /// Unreachable hosts are dropped; use [`StepRunner::run_collect`] to keep them.
    pub fn run(&self, request: &StepRequest<'_>) -> Result<HostResults> {
        Ok(self.run_collect(request)?.into_contacted())
    }

    /// Run one step and return the whole collector.
    ///
    /// The execution context is released before this returns, on success and
    /// on engine errors alike.
    #[instrument(skip_all, fields(pattern = request.pattern, module = request.module, sudo = request.sudo))]
    pub fn run_collect(&self, request: &StepRequest<'_>) -> Result<ResultCollector> {
        let options = ExecutionOptions::for_step(&self.defaults, request.sudo);
        let play = Play {
            hosts: request.pattern.to_string(),
            module: request.module.to_string(),
            args: request.args.cloned(),
            serial: options.forks,
            ignore_errors: request.ignore_errors,
        };

        let context = self
            .engine
            .open(&options, request.become_password)
            .context("acquire execution context")?;
        let mut guard = ContextGuard::new(context);
        let mut collector = ResultCollector::new();
        guard
            .run(&play, &mut collector)
            .with_context(|| format!("run module '{}' on '{}'", request.module, request.pattern))?;
        drop(guard);

        if !collector.unreachable().is_empty() {
            warn!(
                count = collector.unreachable().len(),
                "hosts unreachable"
            );
        }
        debug!(
            contacted = collector.contacted().len(),
            unreachable = collector.unreachable().len(),
            "step finished"
        );
        Ok(collector)
    }
}
