//! Run status and its reporting.
//!
//! A single [`StatusReport`] is created when the launcher starts, filled in
//! as the run progresses, and handed to a [`StatusReporter`] exactly once at
//! the very end. The default reporter logs the outcome and appends it as one
//! NDJSON line to `<logDir>/launcher-status.ndjson` when the project log
//! directory is known.
//!
//! # Record Format
//!
//! - `ts`: RFC3339 timestamp when the record was written
//! - `build_id`: the run identifier
//! - `exit_code`: final exit code
//! - `status_message`: optional failure description
//! - `actor`: `user@HOST`
//! - remaining fields describe how the engine was launched

use crate::error::{LauncherError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Name of the status log inside the project log directory.
pub const STATUS_LOG_FILE: &str = "launcher-status.ndjson";

/// Globally unique identifier of one launcher invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(Uuid);

impl BuildId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the engine was run without the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDaemonReason {
    /// Disabled by configuration or `NO_BUCKD`.
    Explicit,
    /// Help output does not need a daemon.
    Help,
    /// The daemon failed to start.
    DaemonFailure,
}

/// Mutable record of the current run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Command line the launcher was invoked with.
    pub argv: Vec<String>,

    /// Identifier correlating logs, traces and this record.
    pub build_id: BuildId,

    /// Final exit code. Defaults to success.
    pub exit_code: i32,

    /// Description of the failure, if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// Version uid of the repository provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_uid: Option<String>,

    /// Name of the project repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Whether the invocation went through the daemon.
    pub is_daemon: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_daemon_reason: Option<NoDaemonReason>,

    /// When the launcher started.
    pub started_at: DateTime<Utc>,

    /// Project log directory, once discovered.
    #[serde(skip)]
    pub log_dir: Option<PathBuf>,
}

impl StatusReport {
    /// Create a report with a fresh build id and a successful default outcome.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            build_id: BuildId::generate(),
            exit_code: 0,
            status_message: None,
            version_uid: None,
            repository: None,
            is_daemon: false,
            no_daemon_reason: None,
            started_at: Utc::now(),
            log_dir: None,
        }
    }

    /// Record a failure message unless an earlier stage already set one.
    pub fn set_message_if_absent(&mut self, message: impl Into<String>) {
        if self.status_message.is_none() {
            self.status_message = Some(message.into());
        }
    }
}

/// Receives the final status of the run.
pub trait StatusReporter {
    /// Report the final status. Errors are logged by the caller and never
    /// change the exit code.
    fn report(&mut self, status: &StatusReport) -> Result<()>;
}

/// A status line as written to the status log.
#[derive(Debug, Serialize)]
pub struct StatusRecord<'a> {
    pub ts: DateTime<Utc>,
    pub actor: String,
    #[serde(flatten)]
    pub status: &'a StatusReport,
}

/// Default reporter: logs the outcome and appends it to the status log.
#[derive(Debug, Default)]
pub struct LogStatusReporter;

impl StatusReporter for LogStatusReporter {
    fn report(&mut self, status: &StatusReport) -> Result<()> {
        info!(
            build_id = %status.build_id,
            exit_code = status.exit_code,
            "launcher finished"
        );

        match &status.log_dir {
            Some(log_dir) => append_status(log_dir, status),
            None => Ok(()),
        }
    }
}

/// Get the actor string for status records.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append `status` as a single JSON line to the status log in `log_dir`.
pub fn append_status(log_dir: &Path, status: &StatusReport) -> Result<()> {
    let record = StatusRecord {
        ts: Utc::now(),
        actor: get_actor_string(),
        status,
    };
    let json_line = serde_json::to_string(&record).map_err(|e| {
        LauncherError::Engine(format!("failed to serialize status record: {}", e))
    })?;

    fs::create_dir_all(log_dir).map_err(|e| {
        LauncherError::io(
            format!("failed to create log directory '{}'", log_dir.display()),
            e,
        )
    })?;

    let status_file = log_dir.join(STATUS_LOG_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&status_file)
        .map_err(|e| {
            LauncherError::io(
                format!("failed to open status log '{}'", status_file.display()),
                e,
            )
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        LauncherError::io(
            format!("failed to write status to '{}'", status_file.display()),
            e,
        )
    })?;

    Ok(())
}
