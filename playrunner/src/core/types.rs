//! Shared deterministic types for step results and execution logs.
//!
//! These types define stable contracts between the orchestrator, the step
//! runner and callers. Maps are ordered by host name so serialized outputs are
//! stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::step::ModuleArgs;

/// Opaque host identifier resolved from inventory.
pub type Host = String;

/// Per-host outcomes recorded for one step (contacted hosts only).
pub type HostResults = BTreeMap<Host, StepOutcome>;

/// Outcome recorded for one contacted host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    /// Raw result data returned by the engine for this host.
    pub result: Value,
}

impl StepOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result,
        }
    }

    pub fn failed(result: Value) -> Self {
        Self {
            success: false,
            result,
        }
    }

    /// Whether this outcome carries a failure marker.
    ///
    /// A recorded failure always counts. A nominal success still counts when
    /// the engine's result data reports `failed: true`.
    pub fn is_failure(&self) -> bool {
        if !self.success {
            return true;
        }
        matches!(self.result.get("failed"), Some(Value::Bool(true)))
    }
}

/// Log entry for one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    pub module: String,
    pub params: Option<ModuleArgs>,
    pub results: HostResults,
}

impl StepLog {
    /// Hosts whose outcome carries a failure marker, in host order.
    pub fn failed_hosts(&self) -> Vec<&str> {
        failed_hosts(&self.results)
    }
}

/// Ordered log of every step that ran during one playbook run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// Hosts the target resolved to before the first step ran.
    pub hosts: Vec<Host>,
    pub steps: Vec<StepLog>,
}

impl ExecutionLog {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Payload of an aborted run: the failing step and its full per-host mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// 1-indexed position among the steps that actually ran.
    pub step_index: usize,
    pub module: String,
    pub params: Option<ModuleArgs>,
    pub results: HostResults,
}

impl FailureReport {
    pub fn failed_hosts(&self) -> Vec<&str> {
        failed_hosts(&self.results)
    }
}

/// Return hosts whose outcome carries a failure marker.
pub fn failed_hosts(results: &HostResults) -> Vec<&str> {
    results
        .iter()
        .filter(|(_, outcome)| outcome.is_failure())
        .map(|(host, _)| host.as_str())
        .collect()
}
