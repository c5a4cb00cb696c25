//! Centralized environment variable names and default values for engine tuning.

// Environment variable names
pub const ENV_NUM_MAPPERS: &str = "MRKIT_NUM_MAPPERS";
pub const ENV_NUM_REDUCERS: &str = "MRKIT_NUM_REDUCERS";
pub const ENV_INITIAL_CAPACITY: &str = "MRKIT_INITIAL_CAPACITY";
/// Truthy value switches the fatal policy to process termination
pub const ENV_ABORT_ON_FATAL: &str = "MRKIT_ABORT_ON_FATAL";

/// Entries reserved the first time a partition grows; later growth doubles.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Process exit status used when the fatal policy terminates the process.
pub const FATAL_EXIT_CODE: i32 = 1;
