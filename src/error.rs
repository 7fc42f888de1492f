//! Error types for the buck launcher.
//!
//! Every failure that can reach the top of the launcher is a [`LauncherError`],
//! and [`LauncherError::exit_code`] is the single place where a failure is
//! turned into one of the codes in [`crate::exit_codes`].

use crate::exit_codes;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for launcher operations.
#[derive(Error, Debug)]
pub enum LauncherError {
    /// No project root was found walking up from the working directory.
    #[error("no .buckconfig found in '{}' or any of its parent directories", .0.display())]
    NoProjectRoot(PathBuf),

    /// An I/O operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The user interrupted the launcher, or it was asked to terminate.
    #[error("{0}")]
    Interrupted(String),

    /// An administrative operation is not available on this platform.
    #[error("{0}")]
    Unsupported(String),

    /// The process listing used by `killall` had an unexpected shape.
    #[error("cannot parse a line in process listing output: {0:?}")]
    ProcessListing(String),

    /// The process listing command ran but reported failure.
    #[error("process listing failed: {0}")]
    ListingFailed(String),

    /// Launcher settings could not be loaded.
    #[error("invalid launcher configuration: {0}")]
    Config(String),

    /// The build engine could not be prepared or launched.
    #[error("build engine error: {0}")]
    Engine(String),
}

impl LauncherError {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LauncherError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LauncherError::NoProjectRoot(_) => exit_codes::COMMANDLINE_ERROR,
            LauncherError::Io { source, .. } => classify_io(source),
            LauncherError::Interrupted(_) => exit_codes::SIGNAL_INTERRUPT,
            LauncherError::Unsupported(_) => exit_codes::FATAL_GENERIC,
            LauncherError::ProcessListing(_) => exit_codes::FATAL_BOOTSTRAP,
            LauncherError::ListingFailed(_) => exit_codes::FATAL_BOOTSTRAP,
            LauncherError::Config(_) => exit_codes::FATAL_BOOTSTRAP,
            LauncherError::Engine(_) => exit_codes::FATAL_BOOTSTRAP,
        }
    }
}

impl From<io::Error> for LauncherError {
    fn from(source: io::Error) -> Self {
        LauncherError::io("I/O error", source)
    }
}

/// Classify an I/O error: disk full and broken pipe get their own codes.
fn classify_io(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::StorageFull => exit_codes::FATAL_DISK_FULL,
        io::ErrorKind::BrokenPipe => exit_codes::SIGNAL_PIPE,
        _ => exit_codes::FATAL_IO,
    }
}

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, LauncherError>;
