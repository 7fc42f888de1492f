//! Signal and process utilities for the launcher.
//!
//! Termination signals never kill the launcher outright. The handler only
//! raises an [`Interrupt`] flag; blocking waits poll that flag, tear down any
//! child they own, and surface [`LauncherError::Interrupted`] so the scoped
//! project and repository resources unwind normally.

use crate::error::{LauncherError, Result};
use crate::exit_codes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Interval at which blocking waits check for an interrupt.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

static GLOBAL_INTERRUPT: LazyLock<Interrupt> = LazyLock::new(Interrupt::new);
static HANDLERS_INSTALLED: OnceLock<()> = OnceLock::new();

/// Cancellation token raised by SIGINT, SIGTERM or SIGHUP.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide token wired to the signal handlers.
    pub fn global() -> Self {
        GLOBAL_INTERRUPT.clone()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Fail with [`LauncherError::Interrupted`] if the token has been raised.
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(LauncherError::Interrupted(
                "launcher interrupted by user".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Install the launcher's signal handlers.
///
/// Idempotent: only the first call installs anything. Failure to install is
/// logged and otherwise ignored, since the launcher still works without them.
pub fn install_signal_handlers() {
    HANDLERS_INSTALLED.get_or_init(|| {
        let interrupt = Interrupt::global();
        if let Err(e) = ctrlc::set_handler(move || interrupt.raise()) {
            warn!("failed to install signal handlers: {}", e);
        } else {
            debug!("signal handlers installed");
        }
    });
}

/// A request to replace the launcher with a freshly built executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    /// Executable to run; looked up on `PATH` when it has no separator.
    pub path: PathBuf,
    /// Full argument vector, including `argv[0]`.
    pub argv: Vec<String>,
    /// Complete environment for the new process image.
    pub env: BTreeMap<String, String>,
    /// Working directory for the new process image.
    pub cwd: PathBuf,
}

/// Replace the current process image with the hand-off target.
///
/// Only returns on failure. The new image keeps the launcher's pid and
/// standard streams.
#[cfg(unix)]
pub fn replace_current_process(handoff: &Handoff) -> LauncherError {
    use nix::sys::signal::{SigHandler, Signal, signal};
    use std::os::unix::process::CommandExt;

    // Rust ignores SIGPIPE at startup and exec keeps ignored dispositions.
    // SAFETY: restoring the default disposition installs no Rust handler.
    if let Err(e) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) } {
        warn!("failed to restore default SIGPIPE handling: {}", e);
    }

    let mut command = std::process::Command::new(&handoff.path);
    if let Some((arg0, rest)) = handoff.argv.split_first() {
        command.arg0(arg0).args(rest);
    }
    let err = command
        .env_clear()
        .envs(&handoff.env)
        .current_dir(&handoff.cwd)
        .exec();

    LauncherError::io(
        format!("failed to execute '{}'", handoff.path.display()),
        err,
    )
}

/// Run the hand-off target as a child and exit with its status.
///
/// Platforms without `exec` cannot keep the pid, so this is the closest match.
#[cfg(not(unix))]
pub fn replace_current_process(handoff: &Handoff) -> LauncherError {
    let mut command = std::process::Command::new(&handoff.path);
    if let Some((_, rest)) = handoff.argv.split_first() {
        command.args(rest);
    }
    let status = command
        .env_clear()
        .envs(&handoff.env)
        .current_dir(&handoff.cwd)
        .status();

    match status {
        Ok(status) => std::process::exit(status.code().unwrap_or(exit_codes::FATAL_IO)),
        Err(e) => LauncherError::io(
            format!("failed to execute '{}'", handoff.path.display()),
            e,
        ),
    }
}

/// Wait for `child` to exit, killing and reaping it if `interrupt` is raised.
///
/// Returns the child's exit code, with signal deaths mapped to `128 + N`.
pub fn wait_for_child(child: &mut Child, interrupt: &Interrupt) -> Result<i32> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(exit_status_code(status)),
            Ok(None) => {
                if interrupt.is_raised() {
                    kill_child(child);
                    interrupt.check()?;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_child(child);
                return Err(LauncherError::io("failed to check process status", e));
            }
        }
    }
}

/// Kill a process and wait for it to terminate.
fn kill_child(child: &mut Child) {
    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => exit_codes::from_signal(signal),
        (None, None) => exit_codes::FATAL_BOOTSTRAP,
    }
}

#[cfg(not(unix))]
fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(exit_codes::FATAL_BOOTSTRAP)
}
