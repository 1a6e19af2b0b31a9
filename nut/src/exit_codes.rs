//! Stable exit codes for the nut CLI.

/// Run finished; individual task failures are reported but still exit `OK`.
pub const OK: i32 = 0;
/// Invalid arguments or config, or a failure before any task started.
pub const INVALID: i32 = 1;
/// Every task of the run failed.
pub const ALL_FAILED: i32 = 2;
