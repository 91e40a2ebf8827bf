//! Side-effecting adapters: child processes, config, inventory, engine, playbook files.

pub mod config;
pub mod engine;
pub mod inventory;
pub mod playbook_file;
pub mod process;
