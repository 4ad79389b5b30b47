//! Exit code constants for CLI commands
//!
//! - 0: Success
//! - 1: The workflow faulted or was canceled
//! - 2: Configuration, validation or runtime errors

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// The workflow closed without completing
pub const EXIT_WARNING: i32 = 1;

/// The workflow could not be created or run
pub const EXIT_ERROR: i32 = 2;
