//! Sequential playbook runner on top of an Ansible-style automation engine.
//!
//! A playbook is an ordered list of single-module steps. Each step runs as an
//! ephemeral one-task play against a host pattern; the first step that fails
//! on any host aborts the run. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (step model, options, result
//!   collection, logs). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (engine and inventory processes,
//!   config, playbook files). Isolated behind traits to enable scripted doubles.
//!
//! Orchestration modules ([`step`], [`playbook`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod playbook;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
