//! Git queries used to version a checkout of the launcher.
//!
//! A checkout has no package metadata; its version uid is the commit it is
//! checked out at, and it is considered dirty when tracked files differ.

use crate::error::{LauncherError, Result};
use std::path::Path;
use std::process::{Command, Output};

/// Result of a successful git command execution.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Run a git command in `cwd`, failing on a non-zero exit.
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| {
            LauncherError::io(
                format!("failed to execute git {}", args.first().unwrap_or(&"")),
                e,
            )
        })?;

    let git_output = GitOutput::from_output(&output);
    if output.status.success() {
        return Ok(git_output);
    }

    let error_msg = if git_output.stderr.is_empty() {
        git_output.stdout
    } else {
        git_output.stderr
    };
    Err(LauncherError::Engine(format!(
        "git {} failed (exit code {}): {}",
        args.first().unwrap_or(&""),
        output.status.code().unwrap_or(-1),
        error_msg
    )))
}

/// Commit hash currently checked out in `cwd`.
pub fn head_commit<P: AsRef<Path>>(cwd: P) -> Result<String> {
    Ok(run_git(cwd, &["rev-parse", "HEAD"])?.stdout)
}

/// Whether tracked files in `cwd` have uncommitted changes.
pub fn is_dirty<P: AsRef<Path>>(cwd: P) -> Result<bool> {
    let output = run_git(cwd, &["status", "--porcelain", "--untracked-files=no"])?;
    Ok(!output.stdout.is_empty())
}
