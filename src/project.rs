//! Project discovery and per-project paths.
//!
//! A project is the nearest directory, walking up from the working directory,
//! that contains a `.buckconfig` file. All launcher state for the project lives
//! under that root:
//!
//! - `buck-out/log/` for status records and `traces/`
//! - `buck-out/tmp/` for per-run scratch directories
//! - `.buckd/` for the daemon's transport, pid and version files
//!
//! A [`Project`] is a scoped resource. Acquiring it creates a scratch
//! directory for this run; dropping it removes that directory again.

use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::fs::atomic_write_file;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// File marking the root of a project.
pub const PROJECT_MARKER: &str = ".buckconfig";

/// Build output directory relative to the project root.
pub const BUCK_OUT_DIR: &str = "buck-out";

/// Daemon state directory relative to the project root.
pub const DAEMON_DIR: &str = ".buckd";

/// A discovered project root with its launcher settings.
#[derive(Debug)]
pub struct Project {
    /// Absolute path to the directory containing `.buckconfig`.
    pub root: PathBuf,

    /// Launcher settings for this project.
    pub config: LauncherConfig,

    /// Scratch directory for this run, removed on drop.
    run_tmp_dir: TempDir,
}

#[derive(Debug, Deserialize)]
struct ArcConfig {
    project_id: Option<String>,
}

impl Project {
    /// Discover the project from the current working directory.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = env::current_dir()
            .map_err(|e| LauncherError::io("failed to get current working directory", e))?;

        Self::from_dir(&cwd)
    }

    /// Discover the project containing `start`.
    ///
    /// Fails with [`LauncherError::NoProjectRoot`] when neither `start` nor any
    /// of its ancestors contains `.buckconfig`.
    pub fn from_dir<P: AsRef<Path>>(start: P) -> Result<Self> {
        let start = start.as_ref();
        let root = find_project_root(start)
            .ok_or_else(|| LauncherError::NoProjectRoot(start.to_path_buf()))?;
        debug!(root = %root.display(), "found project root");

        let config = LauncherConfig::load_for_project(&root)?;
        let run_tmp_dir = create_run_tmp_dir(&root.join(BUCK_OUT_DIR).join("tmp"))?;

        Ok(Self {
            root,
            config,
            run_tmp_dir,
        })
    }

    /// Directory for launcher logs and traces.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join(BUCK_OUT_DIR).join("log")
    }

    /// Directory where trace artifacts are written.
    pub fn trace_dir(&self) -> PathBuf {
        trace_dir_in(&self.log_dir())
    }

    /// Scratch directory owned by this run.
    pub fn run_tmp_dir(&self) -> &Path {
        self.run_tmp_dir.path()
    }

    /// Daemon state directory.
    pub fn daemon_dir(&self) -> PathBuf {
        self.root.join(DAEMON_DIR)
    }

    /// Path of the daemon's transport (its listening socket).
    pub fn transport_path(&self) -> PathBuf {
        self.daemon_dir().join("sock")
    }

    /// Path of the file recording the daemon's pid.
    pub fn daemon_pid_path(&self) -> PathBuf {
        self.daemon_dir().join("pid")
    }

    /// Path of the file recording the running daemon's version uid.
    pub fn daemon_version_path(&self) -> PathBuf {
        self.daemon_dir().join("buckd.version")
    }

    /// Long-lived scratch directory for the daemon.
    pub fn daemon_tmp_dir(&self) -> Result<PathBuf> {
        let dir = self.daemon_dir().join("tmp");
        fs::create_dir_all(&dir).map_err(|e| {
            LauncherError::io(
                format!("failed to create daemon directory '{}'", dir.display()),
                e,
            )
        })?;
        Ok(dir)
    }

    /// Version uid of the running daemon, if one was recorded.
    pub fn running_daemon_version(&self) -> Option<String> {
        read_trimmed(&self.daemon_version_path())
    }

    /// Pid of the running daemon, if one was recorded.
    pub fn running_daemon_pid(&self) -> Option<u32> {
        read_trimmed(&self.daemon_pid_path()).and_then(|pid| pid.parse().ok())
    }

    /// Record a freshly started daemon.
    pub fn save_daemon(&self, pid: u32, version_uid: &str) -> Result<()> {
        atomic_write_file(self.daemon_pid_path(), &pid.to_string())?;
        atomic_write_file(self.daemon_version_path(), version_uid)
    }

    /// Forget the running daemon's bookkeeping files.
    pub fn clean_up_daemon(&self) -> Result<()> {
        for path in [self.daemon_pid_path(), self.daemon_version_path()] {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    /// Name of the repository the project lives in.
    ///
    /// Uses `project_id` from `.arcconfig` when present, otherwise the name
    /// of the root directory.
    pub fn repository_name(&self) -> Result<String> {
        let arcconfig = self.root.join(".arcconfig");
        if arcconfig.is_file() {
            let content = fs::read_to_string(&arcconfig).map_err(|e| {
                LauncherError::io(format!("failed to read '{}'", arcconfig.display()), e)
            })?;
            let parsed: ArcConfig = serde_json::from_str(&content).map_err(|e| {
                LauncherError::Config(format!("failed to parse '{}': {}", arcconfig.display(), e))
            })?;
            if let Some(project_id) = parsed.project_id {
                return Ok(project_id);
            }
        }

        Ok(self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }
}

/// Walk from `start` towards the filesystem root looking for `.buckconfig`.
fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}

fn create_run_tmp_dir(parent: &Path) -> Result<TempDir> {
    fs::create_dir_all(parent).map_err(|e| {
        LauncherError::io(
            format!("failed to create temporary directory '{}'", parent.display()),
            e,
        )
    })?;

    tempfile::Builder::new()
        .prefix("buck_run.")
        .tempdir_in(parent)
        .map_err(|e| {
            LauncherError::io(
                format!("failed to create run directory in '{}'", parent.display()),
                e,
            )
        })
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Remove a file, treating "already gone" as success.
/// Trace directory inside a log directory.
pub fn trace_dir_in(log_dir: &Path) -> PathBuf {
    log_dir.join("traces")
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LauncherError::io(
            format!("failed to remove '{}'", path.display()),
            e,
        )),
    }
}
