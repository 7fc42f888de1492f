//! Repository providers: where the build engine comes from and how it runs.
//!
//! The launcher is distributed in one of two ways:
//!
//! - **Packaged**: the launcher executable carries a zip payload (it is a
//!   valid zip archive). The engine ships next to it.
//! - **Checkout**: the launcher runs from a source checkout; the engine is
//!   built into `bin/` of that checkout.
//!
//! The choice is made once per run by [`resolve_repository`], based only on
//! whether the launcher's own executable is an archive. Both variants share
//! the same capabilities: [`Repository::kill_build_daemon`] and
//! [`Repository::launch`]. A [`Repository`] borrows its [`Project`], so it
//! is always released before the project is.

mod checkout;
mod daemon;
mod engine;
mod packaged;

pub use checkout::CheckoutRepository;
pub use packaged::{PackagedRepository, is_archive};

use crate::command_line::CommandLineArgs;
use crate::error::{LauncherError, Result};
use crate::process::{Handoff, Interrupt};
use crate::project::Project;
use crate::status::{BuildId, NoDaemonReason, StatusReport};
use crate::trace::Tracer;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the build engine executable.
#[cfg(unix)]
pub const ENGINE_BINARY: &str = "buck-engine";
#[cfg(not(unix))]
pub const ENGINE_BINARY: &str = "buck-engine.exe";

/// Result of dispatching an invocation to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The engine finished with this exit code.
    Completed(i32),
    /// The build succeeded and produced a target to run in place of the
    /// launcher.
    RequestHandoff(Handoff),
}

/// The two ways the engine can be provided.
#[derive(Debug)]
pub enum RepositoryKind {
    Packaged(PackagedRepository),
    Checkout(CheckoutRepository),
}

/// A repository provider bound to a project for the duration of a run.
#[derive(Debug)]
pub struct Repository<'p> {
    kind: RepositoryKind,
    project: &'p Project,
    tracer: Tracer,
    interrupt: Interrupt,
}

/// Select and open the repository provider for this run.
///
/// `launcher` is the launcher's own executable. If it is a zip archive the
/// packaged provider is used; otherwise the checkout rooted at the
/// launcher's directory.
pub fn resolve_repository<'p>(
    launcher: &Path,
    project: &'p Project,
    tracer: &Tracer,
    interrupt: &Interrupt,
) -> Result<Repository<'p>> {
    let _span = tracer.span("resolve_repository");

    let kind = if is_archive(launcher) {
        debug!(launcher = %launcher.display(), "using packaged repository");
        RepositoryKind::Packaged(PackagedRepository::open(launcher)?)
    } else {
        let launcher_dir = launcher.parent().ok_or_else(|| {
            LauncherError::Engine(format!(
                "launcher path '{}' has no parent directory",
                launcher.display()
            ))
        })?;
        debug!(root = %launcher_dir.display(), "using checkout repository");
        RepositoryKind::Checkout(CheckoutRepository::new(launcher_dir))
    };

    Ok(Repository {
        kind,
        project,
        tracer: tracer.clone(),
        interrupt: interrupt.clone(),
    })
}

impl Repository<'_> {
    pub fn kind(&self) -> &RepositoryKind {
        &self.kind
    }

    /// Version uid of the engine this provider launches.
    pub fn version_uid(&self) -> Result<String> {
        if let Some(fake) = &self.project.config.fake_version {
            return Ok(fake.clone());
        }
        match &self.kind {
            RepositoryKind::Packaged(packaged) => packaged.version_uid(),
            RepositoryKind::Checkout(checkout) => Ok(checkout.version_uid()),
        }
    }

    /// Path of the engine executable, honouring the project's override.
    pub fn engine_path(&self) -> PathBuf {
        if let Some(engine) = &self.project.config.engine {
            return self.project.root.join(engine);
        }
        match &self.kind {
            RepositoryKind::Packaged(packaged) => packaged.engine_path(),
            RepositoryKind::Checkout(checkout) => checkout.engine_path(),
        }
    }

    /// Stop the project's daemon, if one is running.
    pub fn kill_build_daemon(&self) -> Result<()> {
        let _span = self.tracer.span("kill_build_daemon");
        daemon::kill(self.project, &self.interrupt)
    }

    /// Dispatch `args` (the command line without the program name) to the
    /// engine.
    pub fn launch(
        &self,
        args: &[String],
        build_id: BuildId,
        status: &mut StatusReport,
    ) -> Result<LaunchOutcome> {
        let _span = self.tracer.span("launch");
        let command_line = CommandLineArgs::parse(args);

        match self.project.repository_name() {
            Ok(name) => status.repository = Some(name),
            Err(e) => warn!("failed to get repository name: {}", e),
        }

        if command_line.is_command("clean") && !command_line.is_help() {
            self.kill_build_daemon()?;
        }

        let version_uid = self.version_uid()?;
        status.version_uid = Some(version_uid.clone());

        if command_line.is_version() {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "buck version {}", version_uid)
                .and_then(|()| stdout.flush())
                .map_err(|e| LauncherError::io("failed to print version", e))?;
            return Ok(LaunchOutcome::Completed(0));
        }

        let engine = self.engine_path();
        if !engine.is_file() {
            return Err(LauncherError::Engine(format!(
                "could not find build engine at '{}'",
                engine.display()
            )));
        }

        let use_daemon = self.decide_daemon(&command_line, &engine, &version_uid, status)?;
        status.is_daemon = use_daemon;

        let invocation = engine::Invocation {
            engine: &engine,
            project: self.project,
            args,
            command_line: &command_line,
            build_id,
            version_uid: &version_uid,
            use_daemon,
            started_at: status.started_at,
        };
        engine::run(&invocation, &self.tracer, &self.interrupt)
    }

    fn decide_daemon(
        &self,
        command_line: &CommandLineArgs,
        engine: &Path,
        version_uid: &str,
        status: &mut StatusReport,
    ) -> Result<bool> {
        if !self.project.config.daemon {
            warn!("Not using buckd because it is disabled (NO_BUCKD or daemon: false).");
            status.no_daemon_reason = Some(NoDaemonReason::Explicit);
            return Ok(false);
        }

        if command_line.is_help() {
            status.no_daemon_reason = Some(NoDaemonReason::Help);
            return Ok(false);
        }

        let running_version = self.project.running_daemon_version();
        if running_version.as_deref() != Some(version_uid) || !daemon::is_running(self.project) {
            self.kill_build_daemon()?;
            let _span = self.tracer.span("launch_daemon");
            if !daemon::start(self.project, engine, version_uid, &self.interrupt)? {
                warn!("Not using buckd because daemon failed to start.");
                status.no_daemon_reason = Some(NoDaemonReason::DaemonFailure);
                return Ok(false);
            }
        }

        Ok(true)
    }
}
