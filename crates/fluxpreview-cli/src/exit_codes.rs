//! Standard exit codes for CLI operations
//!
//! CI workflows branch on these, so they are stable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Input error - malformed reference, duration, configuration, or missing credentials
pub const INPUT_ERROR: i32 = 2;

/// The named resource does not exist
pub const NOT_FOUND: i32 = 3;

/// The caller lacks a Kubernetes or GitHub permission
pub const PERMISSION_DENIED: i32 = 4;

/// IO error - file not found, unreadable, etc.
pub const IO_ERROR: i32 = 5;

/// Readiness or deletion did not happen in time (same as coreutils `timeout`)
pub const TIMEOUT: i32 = 124;
