//! Running the build engine for one invocation.

use super::LaunchOutcome;
use crate::command_line::CommandLineArgs;
use crate::error::{LauncherError, Result};
use crate::process::{Handoff, Interrupt, wait_for_child};
use crate::project::Project;
use crate::status::BuildId;
use crate::trace::Tracer;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Flag telling the engine where to leave the target of `buck run`.
pub const COMMAND_ARGS_FILE_FLAG: &str = "--command-args-file";

/// Everything needed to start the engine for one invocation.
pub(super) struct Invocation<'a> {
    pub engine: &'a Path,
    pub project: &'a Project,
    pub args: &'a [String],
    pub command_line: &'a CommandLineArgs,
    pub build_id: BuildId,
    pub version_uid: &'a str,
    pub use_daemon: bool,
    pub started_at: DateTime<Utc>,
}

/// What the engine leaves in the command args file after a successful
/// `buck run`.
#[derive(Debug, Deserialize)]
struct RunTarget {
    path: PathBuf,
    argv: Vec<String>,
    #[serde(default)]
    envp: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl From<RunTarget> for Handoff {
    fn from(target: RunTarget) -> Self {
        Handoff {
            path: target.path,
            argv: target.argv,
            env: target.envp,
            cwd: target.cwd,
        }
    }
}

/// Run the engine and wait for it.
pub(super) fn run(
    invocation: &Invocation<'_>,
    tracer: &Tracer,
    interrupt: &Interrupt,
) -> Result<LaunchOutcome> {
    let _span = tracer.span_with_args(
        "buck",
        Some(json!({
            "command": invocation.command_line.command,
            "daemon": invocation.use_daemon,
        })),
    );

    let is_run = invocation.command_line.is_command("run") && !invocation.command_line.is_help();
    let args_file = if is_run {
        Some(
            tempfile::Builder::new()
                .prefix("run_args.")
                .suffix(".json")
                .tempfile_in(invocation.project.run_tmp_dir())
                .map_err(|e| LauncherError::io("failed to create command args file", e))?,
        )
    } else {
        None
    };

    let args = engine_args(
        invocation,
        args_file.as_ref().map(|file| file.path()),
    );
    let mut command = Command::new(invocation.engine);
    command
        .args(&args)
        .current_dir(&invocation.project.root)
        .envs(engine_env(invocation));

    debug!(engine = %invocation.engine.display(), ?args, "starting engine");
    let mut child = command.spawn().map_err(|e| {
        LauncherError::io(
            format!("failed to start engine '{}'", invocation.engine.display()),
            e,
        )
    })?;
    let exit_code = wait_for_child(&mut child, interrupt)?;
    debug!(exit_code, "engine finished");

    match args_file {
        Some(file) if exit_code == 0 => read_run_target(file.path()),
        _ => Ok(LaunchOutcome::Completed(exit_code)),
    }
}

/// Engine arguments: configured extras, then the forwarded command line with
/// the command args file spliced in right after the command.
fn engine_args(invocation: &Invocation<'_>, args_file: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = invocation
        .project
        .config
        .engine_args
        .iter()
        .map(OsString::from)
        .collect();

    let command_index = invocation.command_line.buck_options.len();
    for (index, arg) in invocation.args.iter().enumerate() {
        args.push(arg.into());
        if index == command_index
            && let Some(path) = args_file
        {
            args.push(COMMAND_ARGS_FILE_FLAG.into());
            args.push(path.into());
        }
    }

    args
}

fn engine_env(invocation: &Invocation<'_>) -> Vec<(&'static str, OsString)> {
    let init_time_ms = (Utc::now() - invocation.started_at).num_milliseconds().max(0);
    let tty = if std::io::stdin().is_terminal() { "1" } else { "0" };

    let mut env = vec![
        ("BUCK_BUILD_ID", invocation.build_id.to_string().into()),
        ("BUCK_VERSION_UID", invocation.version_uid.into()),
        ("BUCK_TTY", tty.into()),
        ("BUCK_LAUNCHER_INIT_TIME_MS", init_time_ms.to_string().into()),
    ];
    if invocation.use_daemon {
        env.push((
            "BUCK_DAEMON_TRANSPORT",
            invocation.project.transport_path().into_os_string(),
        ));
    }
    env
}

fn read_run_target(path: &Path) -> Result<LaunchOutcome> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LauncherError::io(
            format!("failed to read command args file '{}'", path.display()),
            e,
        )
    })?;
    let target: RunTarget = serde_json::from_str(&content).map_err(|e| {
        LauncherError::Engine(format!(
            "invalid command args file '{}': {}",
            path.display(),
            e
        ))
    })?;
    debug!(path = %target.path.display(), "engine requested hand-off");
    Ok(LaunchOutcome::RequestHandoff(target.into()))
}
