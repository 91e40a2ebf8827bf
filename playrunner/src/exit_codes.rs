//! Stable exit codes for playrunner CLI commands.

/// Command succeeded; every executed step passed.
pub const OK: i32 = 0;
/// Invalid input or config, inventory failure, or engine error.
pub const INVALID: i32 = 1;
/// A step failed on at least one host and the run was aborted.
pub const ABORTED: i32 = 2;
