//! Exit code constants for the buck launcher.
//!
//! Scripts depend on these values, so they never change between releases:
//! - 0: Success
//! - 3: Command-line error (no project root found)
//! - 10: Fatal generic error (administrative operation unsupported)
//! - 11: Fatal bootstrapper error
//! - 13: Fatal I/O error
//! - 14: Fatal disk full
//! - 130: Interrupted by user
//! - 141: Broken pipe
//!
//! Any other value seen by the caller is the build engine's own exit code,
//! passed through unchanged.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Command-line or project-configuration error: no `.buckconfig` found.
pub const COMMANDLINE_ERROR: i32 = 3;

/// Fatal generic error, e.g. `killall` on a non-POSIX system.
pub const FATAL_GENERIC: i32 = 10;

/// Uncaught condition while bootstrapping.
pub const FATAL_BOOTSTRAP: i32 = 11;

/// Any I/O failure not classified more precisely below.
pub const FATAL_IO: i32 = 13;

/// I/O failure caused by a full disk.
pub const FATAL_DISK_FULL: i32 = 14;

/// Interrupted by the user (SIGINT) or asked to terminate.
pub const SIGNAL_INTERRUPT: i32 = 130;

/// Downstream consumer closed its end of a pipe.
pub const SIGNAL_PIPE: i32 = 141;

/// Convert a wait status into the shell convention used by the engine protocol.
///
/// A child terminated by signal `N` is reported as `128 + N`.
pub fn from_signal(signal: i32) -> i32 {
    128 + signal
}

/// Narrow an exit code to the byte a process can actually return.
///
/// Out-of-range values become 255 so they can never read as success.
pub fn to_process_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(u8::MAX)
}
