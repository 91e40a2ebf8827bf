//! Push-style result sink for one step execution.
//!
//! The engine reports each host's outcome through [`ResultSink`]. The step
//! runner creates a fresh [`ResultCollector`] per step and reads its state
//! once the engine returns, so nothing leaks between steps.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::trace;

use crate::core::types::{Host, HostResults, StepOutcome};

/// Observer contract the engine drives while a step executes.
pub trait ResultSink {
    /// Host ran the task successfully.
    fn on_host_ok(&mut self, host: &str, result: Value);

    /// Host ran the task and it failed. `ignore_errors` carries the task's
    /// error policy; ignored failures leave no trace.
    fn on_host_failed(&mut self, host: &str, result: Value, ignore_errors: bool);

    /// Host could not be contacted.
    fn on_host_unreachable(&mut self, host: &str, result: Value);
}

/// Accumulates per-host outcomes for exactly one step.
///
/// A host is in at most one of {contacted-success, contacted-failure,
/// unreachable}; the latest event for a host wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultCollector {
    contacted: HostResults,
    unreachable: BTreeMap<Host, Value>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Success/failure outcomes of contacted hosts.
    pub fn contacted(&self) -> &HostResults {
        &self.contacted
    }

    /// Raw results of hosts that could not be contacted.
    pub fn unreachable(&self) -> &BTreeMap<Host, Value> {
        &self.unreachable
    }

    pub fn is_empty(&self) -> bool {
        self.contacted.is_empty() && self.unreachable.is_empty()
    }

    /// Consume the collector, keeping only the contacted mapping.
    pub fn into_contacted(self) -> HostResults {
        self.contacted
    }

    fn record(&mut self, host: &str, outcome: StepOutcome) {
        self.unreachable.remove(host);
        self.contacted.insert(host.to_string(), outcome);
    }
}

impl ResultSink for ResultCollector {
    fn on_host_ok(&mut self, host: &str, result: Value) {
        trace!(host, "host ok");
        self.record(host, StepOutcome::ok(result));
    }

    fn on_host_failed(&mut self, host: &str, result: Value, ignore_errors: bool) {
        if ignore_errors {
            trace!(host, "host failed, error ignored");
            return;
        }
        trace!(host, "host failed");
        self.record(host, StepOutcome::failed(result));
    }

    fn on_host_unreachable(&mut self, host: &str, result: Value) {
        trace!(host, "host unreachable");
        self.contacted.remove(host);
        self.unreachable.insert(host.to_string(), result);
    }
}
