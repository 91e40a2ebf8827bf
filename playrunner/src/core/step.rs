//! Playbook step model.
//!
//! A playbook is an ordered list of entries. Each entry is either empty (any
//! falsy JSON value, skipped at run time) or a [`PlaybookStep`] validated at
//! construction, so the orchestrator never sees a half-formed step.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Rejected playbook input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedStepError {
    #[error("playbook must be a JSON array of steps")]
    NotAList,
    #[error("entry {index}: expected a step object or an empty value")]
    NotAStep { index: usize },
    #[error("entry {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },
    #[error("step module must be a non-empty name")]
    EmptyModule,
    #[error("invalid module name '{0}'")]
    InvalidModule(String),
}

/// Module arguments: a free-form string or a structured mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleArgs {
    Free(String),
    Structured(Map<String, Value>),
}

impl ModuleArgs {
    /// JSON form handed to the engine as the task's argument value.
    pub fn to_value(&self) -> Value {
        match self {
            ModuleArgs::Free(raw) => Value::String(raw.clone()),
            ModuleArgs::Structured(map) => Value::Object(map.clone()),
        }
    }
}

impl fmt::Display for ModuleArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleArgs::Free(raw) => f.write_str(raw),
            ModuleArgs::Structured(map) => {
                let rendered = serde_json::to_string(map).map_err(|_| fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

impl From<&str> for ModuleArgs {
    fn from(raw: &str) -> Self {
        ModuleArgs::Free(raw.to_string())
    }
}

/// One declarative step: run `module` with `params` on every targeted host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct PlaybookStep {
    module: String,
    params: Option<ModuleArgs>,
    sudo: bool,
    ignore_errors: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    module: String,
    #[serde(default)]
    params: Option<ModuleArgs>,
    #[serde(default)]
    sudo: bool,
    #[serde(default)]
    ignore_errors: bool,
}

impl TryFrom<RawStep> for PlaybookStep {
    type Error = MalformedStepError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        Ok(PlaybookStep::new(raw.module)?
            .with_params(raw.params)
            .with_sudo(raw.sudo)
            .with_ignore_errors(raw.ignore_errors))
    }
}

impl PlaybookStep {
    /// Create a step for `module` with no arguments and escalation disabled.
    pub fn new(module: impl Into<String>) -> Result<Self, MalformedStepError> {
        let module = module.into();
        validate_module_name(&module)?;
        Ok(Self {
            module,
            params: None,
            sudo: false,
            ignore_errors: false,
        })
    }

    pub fn with_params(mut self, params: Option<ModuleArgs>) -> Self {
        self.params = params;
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn params(&self) -> Option<&ModuleArgs> {
        self.params.as_ref()
    }

    pub fn sudo(&self) -> bool {
        self.sudo
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }
}

/// Task keywords the generated play sets next to the module key.
const RESERVED_TASK_KEYS: &[&str] = &["name", "ignore_errors"];

fn validate_module_name(module: &str) -> Result<(), MalformedStepError> {
    if module.trim().is_empty() {
        return Err(MalformedStepError::EmptyModule);
    }
    let valid = module
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid || RESERVED_TASK_KEYS.contains(&module) {
        return Err(MalformedStepError::InvalidModule(module.to_string()));
    }
    Ok(())
}

/// Ordered playbook entries; `None` marks an empty entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playbook {
    entries: Vec<Option<PlaybookStep>>,
}

impl Playbook {
    pub fn new(entries: Vec<Option<PlaybookStep>>) -> Self {
        Self { entries }
    }

    /// Build a playbook with no empty entries.
    pub fn from_steps(steps: Vec<PlaybookStep>) -> Self {
        Self {
            entries: steps.into_iter().map(Some).collect(),
        }
    }

    /// Parse a JSON array of entries. Falsy values become empty entries.
    pub fn from_value(value: &Value) -> Result<Self, MalformedStepError> {
        let items = value.as_array().ok_or(MalformedStepError::NotAList)?;
        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if is_falsy(item) {
                entries.push(None);
                continue;
            }
            if !item.is_object() {
                return Err(MalformedStepError::NotAStep { index });
            }
            let step: PlaybookStep = serde_json::from_value(item.clone()).map_err(|err| {
                MalformedStepError::InvalidEntry {
                    index,
                    reason: err.to_string(),
                }
            })?;
            entries.push(Some(step));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Option<PlaybookStep>] {
        &self.entries
    }

    /// Non-empty steps in playbook order.
    pub fn steps(&self) -> impl Iterator<Item = &PlaybookStep> {
        self.entries.iter().flatten()
    }

    pub fn step_count(&self) -> usize {
        self.steps().count()
    }
}

/// Whether a JSON value counts as "no content".
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Render optional params for log messages.
pub fn display_params(params: Option<&ModuleArgs>) -> String {
    params.map(ToString::to_string).unwrap_or_default()
}
