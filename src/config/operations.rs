//! Config loading, environment overrides and validation.

use super::model::{CONFIG_FILE_NAME, LauncherConfig};
use crate::error::{LauncherError, Result};
use std::path::Path;
use tracing::{debug, info};

impl LauncherConfig {
    /// Load settings for the project at `root`, then apply process
    /// environment overrides.
    ///
    /// A missing settings file yields the defaults.
    pub fn load_for_project(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            Self::load(&path)?
        } else {
            debug!("no {} in project, using defaults", CONFIG_FILE_NAME);
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LauncherError::io(
                format!("failed to read config file '{}'", path.display()),
                e,
            )
        })?;

        Self::from_yaml(&content).map_err(|e| match e {
            LauncherError::Config(message) => {
                LauncherError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Parse settings from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: LauncherConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LauncherError::Config(format!("failed to parse YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// - `NO_BUCKD`: any non-empty value disables the daemon
    /// - `BUCK_ENGINE`: engine path
    /// - `BUCK_EXTRA_ENGINE_ARGS`: shell-split and appended to `engine_args`
    /// - `BUCK_FAKE_VERSION`: reported version uid
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("NO_BUCKD").is_some_and(|v| !v.is_empty()) {
            self.daemon = false;
        }

        if let Some(engine) = lookup("BUCK_ENGINE").filter(|v| !v.is_empty()) {
            self.engine = Some(engine.into());
        }

        if let Some(extra) = lookup("BUCK_EXTRA_ENGINE_ARGS") {
            let args = shell_words::split(&extra).map_err(|e| {
                LauncherError::Config(format!(
                    "failed to parse BUCK_EXTRA_ENGINE_ARGS '{}': {}",
                    extra, e
                ))
            })?;
            self.engine_args.extend(args);
        }

        if let Some(version) = lookup("BUCK_FAKE_VERSION").filter(|v| !v.is_empty()) {
            info!("using fake buck version: {}", version);
            self.fake_version = Some(version);
        }

        Ok(())
    }

    /// Validate settings values.
    pub fn validate(&self) -> Result<()> {
        if self.daemon_startup_timeout_ms == 0 {
            return Err(LauncherError::Config(
                "daemon_startup_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.engine.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(LauncherError::Config("engine must not be empty".to_string()));
        }

        Ok(())
    }
}
