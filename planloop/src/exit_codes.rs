//! Stable exit codes for planloop CLI commands.

/// Command succeeded; for `run`, the agent finished with a result.
pub const OK: i32 = 0;
/// The run aborted, or config/arguments were invalid.
pub const FAILED: i32 = 1;
