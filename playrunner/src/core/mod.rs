//! Deterministic, pure logic shared by the playbook runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod collector;
pub mod credentials;
pub mod options;
pub mod step;
pub mod target;
pub mod types;
