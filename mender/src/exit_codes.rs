//! Stable exit codes for mender CLI commands.

/// Command succeeded; for `mender run`, the mission resolved.
pub const OK: i32 = 0;
/// Command failed due to invalid config, arguments, audit files or other errors.
pub const INVALID: i32 = 1;
/// `mender run` halted: cycle budget or a failure tolerance was exhausted.
pub const HALTED: i32 = 2;
/// `mender run` aborted: the operator denied a HIGH-risk action.
pub const ABORTED: i32 = 3;
