//! Loading playbook files from disk.
//!
//! Files are checked against the bundled v1 JSON Schema first, then parsed
//! into a typed [`Playbook`]. Schema errors are reported all at once; typed
//! parsing reports the first malformed entry.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::step::Playbook;

/// Bundled JSON Schema for playbook files.
pub const PLAYBOOK_V1_SCHEMA: &str = include_str!("../../schemas/playbook/v1.schema.json");

/// Read, validate and parse a playbook file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_playbook(path: &Path) -> Result<Playbook> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let playbook = parse_playbook(&raw).with_context(|| format!("load {}", path.display()))?;
    debug!(
        entries = playbook.entries().len(),
        steps = playbook.step_count(),
        "playbook loaded"
    );
    Ok(playbook)
}

/// Validate raw JSON text against the bundled schema and parse it.
pub fn parse_playbook(raw: &str) -> Result<Playbook> {
    let instance: Value = serde_json::from_str(raw).context("parse playbook json")?;
    let schema: Value =
        serde_json::from_str(PLAYBOOK_V1_SCHEMA).context("parse bundled playbook schema")?;
    validate_schema(&instance, &schema)?;
    let playbook = Playbook::from_value(&instance)?;
    Ok(playbook)
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
