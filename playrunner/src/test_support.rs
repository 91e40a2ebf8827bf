//! Test-only doubles for the engine, inventory and step logger.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::collector::ResultSink;
use crate::core::credentials::BecomePassword;
use crate::core::options::ExecutionOptions;
use crate::core::step::{ModuleArgs, PlaybookStep};
use crate::core::types::Host;
use crate::io::engine::{Engine, EngineContext, Play};
use crate::io::inventory::{ALL_HOSTS, InventoryResolver, effective_pattern};
use crate::logging::StepLogger;

/// One host event replayed into the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Ok(Host, Value),
    Failed(Host, Value),
    Unreachable(Host, Value),
}

impl HostEvent {
    pub fn ok(host: &str, result: Value) -> Self {
        HostEvent::Ok(host.to_string(), result)
    }

    pub fn failed(host: &str, result: Value) -> Self {
        HostEvent::Failed(host.to_string(), result)
    }

    pub fn unreachable(host: &str, result: Value) -> Self {
        HostEvent::Unreachable(host.to_string(), result)
    }
}

/// Scripted behavior for one engine interaction, consumed in order.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// `open` succeeds and `run` replays these events.
    Events(Vec<HostEvent>),
    /// `open` succeeds and `run` fails with this message.
    RunError(String),
    /// `open` itself fails with this message.
    OpenError(String),
}

#[derive(Debug, Default)]
struct Shared {
    script: VecDeque<ScriptedRun>,
    plays: Vec<Play>,
    options: Vec<ExecutionOptions>,
    passwords: Vec<Option<String>>,
    opened: usize,
    cleanups: usize,
}

/// Engine that replays scripted host events without spawning processes.
///
/// Clones share state, so a test can keep a handle after moving the engine
/// into a `StepRunner`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    shared: Rc<RefCell<Shared>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<ScriptedRun>) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                script: script.into(),
                ..Shared::default()
            })),
        }
    }

    /// Plays handed to `run`, in order.
    pub fn plays(&self) -> Vec<Play> {
        self.shared.borrow().plays.clone()
    }

    /// Options each context was opened with.
    pub fn options(&self) -> Vec<ExecutionOptions> {
        self.shared.borrow().options.clone()
    }

    /// Become passwords each context was opened with.
    pub fn passwords(&self) -> Vec<Option<String>> {
        self.shared.borrow().passwords.clone()
    }

    pub fn opened(&self) -> usize {
        self.shared.borrow().opened
    }

    pub fn cleanups(&self) -> usize {
        self.shared.borrow().cleanups
    }

    /// Scripted runs not consumed yet.
    pub fn remaining(&self) -> usize {
        self.shared.borrow().script.len()
    }

    /// Panic if scripted runs remain unconsumed.
    pub fn assert_drained(&self) {
        let remaining = self.remaining();
        assert_eq!(remaining, 0, "scripted engine has {remaining} unused runs");
    }
}

impl Engine for ScriptedEngine {
    type Context = ScriptedContext;

    fn open(
        &self,
        options: &ExecutionOptions,
        become_password: Option<&BecomePassword>,
    ) -> Result<ScriptedContext> {
        let mut shared = self.shared.borrow_mut();
        if let Some(ScriptedRun::OpenError(_)) = shared.script.front()
            && let Some(ScriptedRun::OpenError(message)) = shared.script.pop_front()
        {
            return Err(anyhow!(message));
        }
        shared.opened += 1;
        shared.options.push(options.clone());
        shared
            .passwords
            .push(become_password.map(|p| p.expose().to_string()));
        Ok(ScriptedContext {
            shared: Rc::clone(&self.shared),
            released: false,
        })
    }
}

/// Context handed out by [`ScriptedEngine`]; counts its release.
#[derive(Debug)]
pub struct ScriptedContext {
    shared: Rc<RefCell<Shared>>,
    released: bool,
}

impl EngineContext for ScriptedContext {
    fn run(&mut self, play: &Play, sink: &mut dyn ResultSink) -> Result<()> {
        let next = {
            let mut shared = self.shared.borrow_mut();
            shared.plays.push(play.clone());
            shared.script.pop_front()
        };
        match next {
            Some(ScriptedRun::Events(events)) => {
                for event in events {
                    match event {
                        HostEvent::Ok(host, result) => sink.on_host_ok(&host, result),
                        HostEvent::Failed(host, result) => {
                            sink.on_host_failed(&host, result, play.ignore_errors);
                        }
                        HostEvent::Unreachable(host, result) => {
                            sink.on_host_unreachable(&host, result);
                        }
                    }
                }
                Ok(())
            }
            Some(ScriptedRun::RunError(message) | ScriptedRun::OpenError(message)) => {
                Err(anyhow!(message))
            }
            None => Err(anyhow!("scripted engine exhausted")),
        }
    }

    fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.borrow_mut().cleanups += 1;
    }
}

/// Inventory over a fixed host list.
///
/// `all` matches every host; otherwise the pattern is split on `,` and each
/// part must name a host exactly.
#[derive(Debug, Default)]
pub struct StaticInventory {
    hosts: Vec<Host>,
    failure: Option<String>,
    patterns: RefCell<Vec<String>>,
}

impl StaticInventory {
    pub fn new(hosts: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Inventory whose source cannot be read.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Patterns passed to `resolve`, in order.
    pub fn patterns(&self) -> Vec<String> {
        self.patterns.borrow().clone()
    }
}

impl InventoryResolver for StaticInventory {
    fn resolve(&self, pattern: Option<&str>) -> Result<Vec<Host>> {
        let pattern = effective_pattern(pattern);
        self.patterns.borrow_mut().push(pattern.to_string());
        if let Some(message) = &self.failure {
            return Err(anyhow!(message.clone()));
        }
        if pattern == ALL_HOSTS {
            return Ok(self.hosts.clone());
        }
        let wanted: Vec<&str> = pattern.split(',').map(str::trim).collect();
        Ok(self
            .hosts
            .iter()
            .filter(|host| wanted.contains(&host.as_str()))
            .cloned()
            .collect())
    }
}

/// Severity of a recorded step message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

/// [`StepLogger`] that keeps every message for assertions.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: RefCell<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.borrow().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.messages(LogLevel::Info)
    }

    pub fn debugs(&self) -> Vec<String> {
        self.messages(LogLevel::Debug)
    }

    fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl StepLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.entries
            .borrow_mut()
            .push((LogLevel::Info, message.to_string()));
    }

    fn debug(&self, message: &str) {
        self.entries
            .borrow_mut()
            .push((LogLevel::Debug, message.to_string()));
    }
}

/// Step running `module` with free-form `params`.
pub fn step(module: &str, params: &str) -> PlaybookStep {
    PlaybookStep::new(module)
        .expect("valid module name")
        .with_params(Some(ModuleArgs::from(params)))
}

/// `shell` step running `command`.
pub fn shell(command: &str) -> PlaybookStep {
    step("shell", command)
}
