//! Starting and stopping the per-project build daemon.
//!
//! The daemon listens on the project's transport path. Its pid and version
//! uid are recorded under `.buckd/` so later runs can tell whether it is still
//! the right daemon.

use crate::error::{LauncherError, Result};
use crate::process::Interrupt;
use crate::project::{Project, remove_if_exists};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How many polls to wait for a terminated daemon to release its transport.
const SHUTDOWN_POLLS: u32 = 300;

/// Whether the recorded daemon is alive and listening.
pub(super) fn is_running(project: &Project) -> bool {
    if !project.transport_path().exists() {
        return false;
    }
    match project.running_daemon_pid() {
        Some(pid) => daemon_alive(pid),
        None => false,
    }
}

/// Start a daemon for `version_uid` and wait until it is listening.
///
/// Returns `Ok(false)` if the daemon exits or does not listen within the
/// configured startup timeout; the caller then runs without it.
pub(super) fn start(
    project: &Project,
    engine: &Path,
    version_uid: &str,
    interrupt: &Interrupt,
) -> Result<bool> {
    let transport = project.transport_path();
    let daemon_tmp_dir = project.daemon_tmp_dir()?;

    let mut command = Command::new(engine);
    command
        .args(&project.config.engine_args)
        .arg("--daemon")
        .arg(&transport)
        .current_dir(&project.root)
        .env("BUCK_DAEMON_TMP_DIR", &daemon_tmp_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach(&mut command);

    let mut child = command.spawn().map_err(|e| {
        LauncherError::io(format!("failed to start daemon '{}'", engine.display()), e)
    })?;
    debug!(pid = child.id(), "started daemon");
    if let Err(e) = project.save_daemon(child.id(), version_uid) {
        abandon(&mut child, project);
        return Err(e);
    }

    let timeout = Duration::from_millis(project.config.daemon_startup_timeout_ms);
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            warn!("daemon exited during startup: {}", status);
            project.clean_up_daemon()?;
            return Ok(false);
        }
        if transport.exists() {
            return Ok(true);
        }
        if interrupt.is_raised() {
            abandon(&mut child, project);
            interrupt.check()?;
        }
        if Instant::now() >= deadline {
            warn!(
                "daemon did not listen on '{}' within {:?}",
                transport.display(),
                timeout
            );
            abandon(&mut child, project);
            return Ok(false);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Stop the recorded daemon and forget it.
///
/// The daemon is asked to terminate and given a few seconds to remove its
/// transport; a transport left behind is removed here. A recorded pid that no
/// longer names a daemon is never signalled.
pub(super) fn kill(project: &Project, interrupt: &Interrupt) -> Result<()> {
    let transport = project.transport_path();

    if transport.exists() {
        debug!("Shutting down buck daemon.");
        if let Some(pid) = project.running_daemon_pid()
            && terminate(pid)
        {
            for _ in 0..SHUTDOWN_POLLS {
                if !transport.exists() {
                    break;
                }
                interrupt.check()?;
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        if transport.exists() {
            debug!(transport = %transport.display(), "removing stale daemon transport");
            remove_if_exists(&transport)?;
        }
    }

    project.clean_up_daemon()
}

/// Kill a daemon that never came up and forget it.
fn abandon(child: &mut Child, project: &Project) {
    let _ = child.kill();
    let _ = child.wait();
    if let Err(e) = project.clean_up_daemon() {
        warn!("failed to clean up daemon state: {}", e);
    }
}

/// Put the daemon in its own process group so terminal signals aimed at the
/// launcher do not reach it.
#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}

/// Signal the daemon's process group. Returns whether a signal was sent.
#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if !daemon_alive(pid) {
        debug!(pid, "recorded pid is not a running daemon");
        return false;
    }
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, "failed to signal daemon: {}", e);
            false
        }
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) -> bool {
    debug!(pid, "daemon termination by signal is not supported on this platform");
    false
}

/// Whether `pid` is alive and still looks like the daemon we started.
///
/// The daemon leads its own process group, so a recycled pid held by an
/// unrelated process does not match.
#[cfg(unix)]
fn daemon_alive(pid: u32) -> bool {
    use nix::unistd::{Pid, getpgid};

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    let pid = Pid::from_raw(raw);
    matches!(getpgid(Some(pid)), Ok(group) if group == pid)
}

#[cfg(not(unix))]
fn daemon_alive(_pid: u32) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{create_test_project, write_script};
    use std::fs;

    fn project_with(config_yaml: &str) -> (tempfile::TempDir, Project) {
        let temp_dir = create_test_project();
        fs::write(
            temp_dir.path().join(crate::config::CONFIG_FILE_NAME),
            config_yaml,
        )
        .unwrap();
        let project = Project::from_dir(temp_dir.path()).unwrap();
        (temp_dir, project)
    }

    #[test]
    fn start_waits_for_transport_and_records_daemon() {
        let (temp_dir, project) = project_with("daemon_startup_timeout_ms: 5000\n");
        let engine = temp_dir.path().join("engine");
        // Creates the transport, then stays alive like a real daemon.
        write_script(
            &engine,
            "[ \"$1\" = --daemon ] || exit 2\ntouch \"$2\"\nexec sleep 30",
        );

        let started = start(&project, &engine, "v1", &Interrupt::new()).unwrap();

        assert!(started);
        assert!(project.transport_path().exists());
        assert_eq!(project.running_daemon_version().as_deref(), Some("v1"));
        assert!(is_running(&project));

        kill(&project, &Interrupt::new()).unwrap();
        assert!(!project.transport_path().exists());
        assert!(project.running_daemon_pid().is_none());
        assert!(!is_running(&project));
    }

    #[test]
    fn start_reports_failure_when_daemon_exits() {
        let (temp_dir, project) = project_with("");
        let engine = temp_dir.path().join("engine");
        write_script(&engine, "exit 1");

        let started = start(&project, &engine, "v1", &Interrupt::new()).unwrap();

        assert!(!started);
        assert!(project.running_daemon_version().is_none());
    }

    #[test]
    fn start_gives_up_after_timeout() {
        let (temp_dir, project) = project_with("daemon_startup_timeout_ms: 100\n");
        let engine = temp_dir.path().join("engine");
        write_script(&engine, "exec sleep 30");

        let begun = Instant::now();
        let started = start(&project, &engine, "v1", &Interrupt::new()).unwrap();

        assert!(!started);
        assert!(begun.elapsed() < Duration::from_secs(10));
        assert!(project.running_daemon_pid().is_none());
    }

    #[test]
    fn start_stops_on_interrupt() {
        let (temp_dir, project) = project_with("");
        let engine = temp_dir.path().join("engine");
        write_script(&engine, "exec sleep 30");

        let interrupt = Interrupt::new();
        interrupt.raise();
        let err = start(&project, &engine, "v1", &interrupt).unwrap_err();

        assert_eq!(err.exit_code(), crate::exit_codes::SIGNAL_INTERRUPT);
        assert!(project.running_daemon_pid().is_none());
    }

    #[test]
    fn start_stops_daemon_it_cannot_record() {
        let (temp_dir, project) = project_with("daemon_startup_timeout_ms: 5000\n");
        let engine = temp_dir.path().join("engine");
        let pid_file = temp_dir.path().join("engine.pid");
        write_script(
            &engine,
            &format!("echo $$ > \"{}\"\nexec sleep 30", pid_file.display()),
        );
        // A directory in place of the pid file makes recording fail.
        fs::create_dir_all(project.daemon_pid_path().join("occupied")).unwrap();

        let err = start(&project, &engine, "v1", &Interrupt::new());

        assert!(err.is_err());
        assert!(project.running_daemon_version().is_none());
        if let Ok(pid) = fs::read_to_string(&pid_file) {
            let pid: u32 = pid.trim().parse().unwrap();
            assert!(!daemon_alive(pid), "daemon {} outlived a failed start", pid);
        }
    }

    #[test]
    fn kill_spares_unrelated_process_holding_recorded_pid() {
        let (_temp_dir, project) = project_with("");
        let mut bystander = Command::new("sleep").arg("30").spawn().unwrap();
        fs::create_dir_all(project.daemon_dir()).unwrap();
        fs::write(project.transport_path(), "").unwrap();
        fs::write(project.daemon_pid_path(), bystander.id().to_string()).unwrap();

        assert!(!is_running(&project));
        kill(&project, &Interrupt::new()).unwrap();

        let still_running = bystander.try_wait().unwrap().is_none();
        let _ = bystander.kill();
        let _ = bystander.wait();
        assert!(still_running);
        assert!(!project.transport_path().exists());
        assert!(project.running_daemon_pid().is_none());
    }

    #[test]
    fn kill_removes_stale_transport() {
        let (_temp_dir, project) = project_with("");
        fs::create_dir_all(project.daemon_dir()).unwrap();
        fs::write(project.transport_path(), "").unwrap();
        fs::write(project.daemon_version_path(), "old").unwrap();

        kill(&project, &Interrupt::new()).unwrap();

        assert!(!project.transport_path().exists());
        assert!(project.running_daemon_version().is_none());
    }

    #[test]
    fn kill_without_daemon_is_noop() {
        let (_temp_dir, project) = project_with("");
        kill(&project, &Interrupt::new()).unwrap();
        assert!(!is_running(&project));
    }
}
