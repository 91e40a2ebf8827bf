//! Logging for playrunner.
//!
//! # Separation of Concerns
//!
//! - **Tracing ([`init`])**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not part of the run's result.
//!
//! - **Step logging ([`StepLogger`])**: the per-step announcements and abort
//!   dumps a caller asks for by passing a logger to the orchestrator. Absence
//!   of a logger means no step messages at all.

use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=playrunner=debug playrunner run site.json --target web
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Receiver for orchestrator step messages.
pub trait StepLogger {
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
}

/// [`StepLogger`] that forwards to `tracing` under the `playrunner::steps` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl StepLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "playrunner::steps", "{message}");
    }

    fn debug(&self, message: &str) {
        debug!(target: "playrunner::steps", "{message}");
    }
}
