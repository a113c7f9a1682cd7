//! Stable exit codes for the fixbot CLI.

/// Run finished: proposal opened, one already existed, or nothing to fix.
pub const OK: i32 = 0;
/// Unexpected failure outside the tagged pipeline stages (a panic).
pub const INTERNAL: i32 = 1;
/// Required environment variable missing or config file invalid.
pub const CONFIGURATION: i32 = 2;
/// Hosted API call failed (metadata, ref resolution, proposal listing).
pub const UPSTREAM_API: i32 = 3;
/// Shallow clone of the repository failed.
pub const CLONE: i32 = 4;
/// Local branch, checkout, status, commit, or push failed.
pub const GIT_OPERATION: i32 = 5;
/// Fix tool could not be run or exited non-zero.
pub const EXECUTION: i32 = 6;
/// Change proposal could not be created.
pub const PUBLISH: i32 = 7;
/// Unknown subcommand or malformed arguments (sysexits `EX_USAGE`).
pub const USAGE: i32 = 64;
