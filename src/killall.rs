//! `buck killall`: terminate every build daemon on this machine.
//!
//! Daemons are found through the JVM process listing (`jps -l`), which prints
//! one `<pid> <main class>` pair per line. Any process whose main class is the
//! daemon bootstrapper receives SIGTERM. Delivery is fire-and-forget; nothing
//! waits for the processes to actually exit.

use crate::error::{LauncherError, Result};
use crate::exit_codes;
use crate::status::StatusReport;
use std::process::{Command, Output};
use tracing::{debug, error, warn};

/// Main class of every daemon process started by the launcher.
pub const DAEMON_BOOTSTRAP_CLASS: &str = "com.facebook.buck.cli.bootstrapper.ClassLoaderBootstrapper";

/// A process reported by the process listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedProcess {
    pub pid: u32,
    pub name: String,
}

/// Source of running processes and the means to terminate them.
pub trait ProcessTable {
    /// Whether this platform supports `killall` at all.
    fn supported(&self) -> bool {
        cfg!(unix)
    }

    /// Raw process listing, one process per line.
    fn listing(&self) -> Result<String>;

    /// Ask the process to terminate.
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Process table backed by `jps -l` and SIGTERM.
#[derive(Debug, Default)]
pub struct JpsProcessTable;

impl ProcessTable for JpsProcessTable {
    fn listing(&self) -> Result<String> {
        let output = Command::new("jps")
            .arg("-l")
            .output()
            .map_err(|e| LauncherError::io("failed to run 'jps -l'", e))?;
        listing_from_output(&output)
    }

    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| LauncherError::ProcessListing(format!("pid out of range: {}", pid)))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| {
            LauncherError::io(
                format!("failed to signal process {}", pid),
                std::io::Error::from(errno),
            )
        })
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> Result<()> {
        Err(LauncherError::Unsupported(format!(
            "cannot signal process {} on this platform",
            pid
        )))
    }
}

/// Parse a process listing into `(pid, name)` pairs.
///
/// Blank lines and lines with only a pid (processes started without a main
/// class, such as IDEs) are skipped. Any other shape aborts the whole parse:
/// silently ignoring it would turn a listing format change into a no-op.
pub fn parse_listing(output: &str) -> Result<Vec<ListedProcess>> {
    let mut processes = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] | [_] => continue,
            [pid, name] => {
                let pid = pid
                    .parse::<u32>()
                    .map_err(|_| LauncherError::ProcessListing(line.to_string()))?;
                processes.push(ListedProcess {
                    pid,
                    name: (*name).to_string(),
                });
            }
            _ => return Err(LauncherError::ProcessListing(line.to_string())),
        }
    }

    Ok(processes)
}

/// Stdout of a finished listing command, or an error if it did not succeed.
///
/// A failed command may print nothing, which would otherwise read as an empty
/// process table.
fn listing_from_output(output: &Output) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LauncherError::ListingFailed(format!(
            "'jps -l' {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Terminate every daemon on this machine.
///
/// Returns [`exit_codes::FATAL_GENERIC`] with a status message on platforms
/// without support; otherwise [`exit_codes::SUCCESS`] once every match has
/// been signalled.
pub fn kill_all_daemons(table: &impl ProcessTable, status: &mut StatusReport) -> Result<i32> {
    if !table.supported() {
        let message = format!("killall is not implemented on: {}", std::env::consts::OS);
        error!("{}", message);
        status.status_message = Some(message);
        return Ok(exit_codes::FATAL_GENERIC);
    }

    let processes = parse_listing(&table.listing()?)?;
    for process in processes
        .iter()
        .filter(|p| p.name == DAEMON_BOOTSTRAP_CLASS)
    {
        debug!(pid = process.pid, "terminating daemon");
        if let Err(e) = table.terminate(process.pid) {
            warn!("{}", e);
        }
    }

    Ok(exit_codes::SUCCESS)
}
