//! Sequential playbook orchestration with abort-on-first-failure.
//!
//! A run resolves the target once, then executes the non-empty steps in
//! order. Per-host failures are data until one shows up in a step's mapping;
//! that step aborts the run with its full mapping. Steps never overlap.

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::credentials::BecomePassword;
use crate::core::step::{Playbook, display_params};
use crate::core::target::Target;
use crate::core::types::{ExecutionLog, FailureReport, HostResults, StepLog, failed_hosts};
use crate::io::engine::Engine;
use crate::io::inventory::{InventoryResolver, effective_pattern};
use crate::logging::StepLogger;
use crate::step::{StepRequest, StepRunner};

/// Why a playbook run stopped before completing.
#[derive(Debug, Error)]
pub enum PlaybookError {
    /// The target could not be resolved. No step ran.
    #[error("could not resolve target '{target}'")]
    Inventory {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// The engine failed while running a step.
    #[error("step {step_index} ({module}) could not be executed")]
    Engine {
        step_index: usize,
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// A step reported at least one failed host.
    #[error(
        "step {} ({}) failed on: {}",
        .0.step_index,
        .0.module,
        .0.failed_hosts().join(", ")
    )]
    Aborted(FailureReport),
}

impl PlaybookError {
    /// Failure report when the run aborted on a failed host.
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            PlaybookError::Aborted(report) => Some(report),
            _ => None,
        }
    }
}

/// Run every non-empty step of `playbook` against `target`.
///
/// Returns the full execution log when all steps succeed. Stops at the first
/// step whose mapping carries a failure marker; later steps never execute.
#[instrument(skip_all, fields(target = %target.to_pattern(), steps = playbook.step_count()))]
pub fn run_playbook<E, I>(
    runner: &StepRunner<E>,
    inventory: &I,
    target: &Target,
    playbook: &Playbook,
    become_password: Option<&BecomePassword>,
    logger: Option<&dyn StepLogger>,
) -> Result<ExecutionLog, PlaybookError>
where
    E: Engine,
    I: InventoryResolver + ?Sized,
{
    let pattern = effective_pattern(Some(&target.to_pattern())).to_string();
    let hosts = inventory
        .resolve(Some(&pattern))
        .map_err(|source| PlaybookError::Inventory {
            target: pattern.clone(),
            source,
        })?;
    if hosts.is_empty() {
        warn!(pattern = %pattern, "target matched no hosts");
    }

    let mut log = ExecutionLog {
        hosts,
        steps: Vec::new(),
    };
    for step in playbook.steps() {
        let step_index = log.steps.len() + 1;
        if let Some(logger) = logger {
            logger.info(&format!(
                "ansible: host({pattern}) module({}) params({})",
                step.module(),
                display_params(step.params())
            ));
        }

        let request = StepRequest::for_step(&pattern, step, become_password);
        let results = runner
            .run(&request)
            .map_err(|source| PlaybookError::Engine {
                step_index,
                module: step.module().to_string(),
                source,
            })?;

        let failed = failed_hosts(&results).len();
        log.steps.push(StepLog {
            module: step.module().to_string(),
            params: step.params().cloned(),
            results: results.clone(),
        });

        if failed > 0 {
            warn!(step_index, module = step.module(), failed, "step failed, aborting");
            if let Some(logger) = logger {
                logger.debug(&render_results(&results));
            }
            return Err(PlaybookError::Aborted(FailureReport {
                step_index,
                module: step.module().to_string(),
                params: step.params().cloned(),
                results,
            }));
        }
    }

    info!(steps = log.len(), "playbook completed");
    Ok(log)
}

fn render_results(results: &HostResults) -> String {
    serde_json::to_string_pretty(results).unwrap_or_else(|_| format!("{results:?}"))
}
