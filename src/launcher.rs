//! Top-level control flow of one launcher run.
//!
//! A run moves through these stages:
//!
//! 1. Administrative check: `killall` is handled immediately, without a
//!    project.
//! 2. Signal handlers are installed.
//! 3. Inside the `main` trace span: discover the project, acquire the
//!    repository provider, then either kill the project's daemon (`kill`) or
//!    dispatch the invocation to the engine.
//! 4. The trace is written if the project's log directory is known.
//! 5. The final status is reported exactly once.
//!
//! Every error raised in stage 3 is classified once, here, into an exit code.
//! A successful `run` ends with a [`Handoff`], which the caller executes only
//! after the report has gone out.

use crate::cli::Invocation;
use crate::error::{LauncherError, Result};
use crate::killall::{JpsProcessTable, kill_all_daemons};
use crate::process::{self, Handoff, Interrupt};
use crate::project::{Project, trace_dir_in};
use crate::repository::{self, LaunchOutcome, Repository};
use crate::status::{BuildId, StatusReport, StatusReporter};
use crate::trace::Tracer;
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Operations a repository provider offers to the launcher.
pub trait Provider {
    fn kill_build_daemon(&self) -> Result<()>;

    fn launch(
        &self,
        args: &[String],
        build_id: BuildId,
        status: &mut StatusReport,
    ) -> Result<LaunchOutcome>;
}

impl Provider for Repository<'_> {
    fn kill_build_daemon(&self) -> Result<()> {
        Repository::kill_build_daemon(self)
    }

    fn launch(
        &self,
        args: &[String],
        build_id: BuildId,
        status: &mut StatusReport,
    ) -> Result<LaunchOutcome> {
        Repository::launch(self, args, build_id, status)
    }
}

/// The machine the launcher runs on.
pub trait Host {
    fn install_signal_handlers(&mut self);

    /// Terminate every daemon on the machine, returning the exit code.
    fn kill_all(&mut self, status: &mut StatusReport) -> Result<i32>;

    fn discover_project(&mut self) -> Result<Project>;

    fn resolve_repository<'p>(
        &mut self,
        project: &'p Project,
        tracer: &Tracer,
        interrupt: &Interrupt,
    ) -> Result<Box<dyn Provider + 'p>>;
}

/// The real host: working directory, process table and own executable.
#[derive(Debug, Default)]
pub struct SystemHost {
    process_table: JpsProcessTable,
}

impl SystemHost {
    fn launcher_path() -> Result<PathBuf> {
        let exe = std::env::current_exe()
            .map_err(|e| LauncherError::io("failed to locate launcher executable", e))?;
        // Resolve symlinks so a checkout launcher linked onto PATH still
        // finds its own tree.
        Ok(exe.canonicalize().unwrap_or(exe))
    }
}

impl Host for SystemHost {
    fn install_signal_handlers(&mut self) {
        process::install_signal_handlers();
    }

    fn kill_all(&mut self, status: &mut StatusReport) -> Result<i32> {
        kill_all_daemons(&self.process_table, status)
    }

    fn discover_project(&mut self) -> Result<Project> {
        Project::from_current_dir()
    }

    fn resolve_repository<'p>(
        &mut self,
        project: &'p Project,
        tracer: &Tracer,
        interrupt: &Interrupt,
    ) -> Result<Box<dyn Provider + 'p>> {
        let launcher = Self::launcher_path()?;
        let repository = repository::resolve_repository(&launcher, project, tracer, interrupt)?;
        Ok(Box::new(repository))
    }
}

/// How the process should end.
#[derive(Debug, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    /// Executable to replace the launcher with. Already reported as success.
    pub handoff: Option<Handoff>,
}

/// Run the launcher for `argv` (including the program name).
pub fn run(
    argv: Vec<String>,
    host: &mut impl Host,
    reporter: &mut impl StatusReporter,
    interrupt: &Interrupt,
) -> RunResult {
    let invocation = Invocation::classify(argv.get(1..).unwrap_or_default());
    let mut status = StatusReport::new(argv);

    let handoff = if invocation == Invocation::KillAll {
        match host.kill_all(&mut status) {
            Ok(code) => status.exit_code = code,
            Err(e) => classify(&mut status, &e),
        }
        None
    } else {
        host.install_signal_handlers();
        let tracer = Tracer::new();

        let result = {
            let _main = tracer.span("main");
            dispatch(&invocation, host, &mut status, &tracer, interrupt)
        };
        let handoff = match result {
            Ok(handoff) => handoff,
            Err(e) => {
                classify(&mut status, &e);
                None
            }
        };

        write_trace(&tracer, &status);
        handoff
    };

    if let Err(e) = reporter.report(&status) {
        debug!("failed to report status: {}", e);
    }

    RunResult {
        exit_code: status.exit_code,
        handoff,
    }
}

/// Discover the project, acquire the provider and act on the invocation.
///
/// The provider borrows the project, so it is released first.
fn dispatch(
    invocation: &Invocation,
    host: &mut impl Host,
    status: &mut StatusReport,
    tracer: &Tracer,
    interrupt: &Interrupt,
) -> Result<Option<Handoff>> {
    let project = {
        let _span = tracer.span("discover_project");
        host.discover_project()?
    };
    status.log_dir = Some(project.log_dir());
    interrupt.check()?;

    let provider = host.resolve_repository(&project, tracer, interrupt)?;
    interrupt.check()?;

    match invocation {
        Invocation::KillAll | Invocation::KillDaemon => {
            provider.kill_build_daemon()?;
            status.exit_code = 0;
            Ok(None)
        }
        Invocation::Forward(args) => match provider.launch(args, status.build_id, status)? {
            LaunchOutcome::Completed(code) => {
                status.exit_code = code;
                Ok(None)
            }
            LaunchOutcome::RequestHandoff(handoff) => {
                status.exit_code = 0;
                Ok(Some(handoff))
            }
        },
    }
}

fn classify(status: &mut StatusReport, err: &LauncherError) {
    status.exit_code = err.exit_code();
    status.set_message_if_absent(err.to_string());

    match err {
        LauncherError::Interrupted(_) => warn!("{}", err),
        _ => error!("{}", err),
    }
}

/// Persist the trace, if the project's log directory was found.
fn write_trace(tracer: &Tracer, status: &StatusReport) {
    let Some(log_dir) = &status.log_dir else {
        return;
    };

    match tracer.write_to_dir(&trace_dir_in(log_dir), &status.build_id) {
        Ok(path) => debug!(path = %path.display(), "wrote trace"),
        Err(e) => warn!("failed to write trace: {}", e),
    }
}

#[cfg(test)]
mod tests;
