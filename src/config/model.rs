//! LauncherConfig struct definition and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the settings file at the project root.
pub const CONFIG_FILE_NAME: &str = ".buck-launcher.yaml";

/// Launcher settings for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Explicit path to the build engine; relative paths resolve against the
    /// project root. When unset, the repository provider picks its own.
    pub engine: Option<PathBuf>,

    /// Whether invocations go through the long-lived daemon.
    #[serde(default = "default_true")]
    pub daemon: bool,

    /// How long to wait for a freshly started daemon to open its transport.
    #[serde(default = "default_daemon_startup_timeout_ms")]
    pub daemon_startup_timeout_ms: u64,

    /// Extra arguments passed to every engine invocation, before the
    /// forwarded command line.
    pub engine_args: Vec<String>,

    /// Version uid reported instead of the provider's real one.
    #[serde(skip)]
    pub fake_version: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_daemon_startup_timeout_ms() -> u64 {
    10_000
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            engine: None,
            daemon: default_true(),
            daemon_startup_timeout_ms: default_daemon_startup_timeout_ms(),
            engine_args: Vec::new(),
            fake_version: None,
        }
    }
}
