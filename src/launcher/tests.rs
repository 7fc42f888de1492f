//! Tests for the launcher's control flow, using a fake host and provider.

use super::*;
use crate::exit_codes;
use crate::killall::ProcessTable;
use crate::test_support::create_test_project;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;
use tempfile::TempDir;

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn argv(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn test_handoff() -> Handoff {
    Handoff {
        path: PathBuf::from("/bin/true"),
        argv: argv(&["true"]),
        env: BTreeMap::new(),
        cwd: PathBuf::from("/"),
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Complete(i32),
    Handoff,
    DiskFull,
}

struct FakeProvider {
    behavior: Behavior,
    log: Log,
    seen_build_id: Rc<Cell<Option<BuildId>>>,
}

impl Provider for FakeProvider {
    fn kill_build_daemon(&self) -> Result<()> {
        push(&self.log, "kill_build_daemon");
        Ok(())
    }

    fn launch(
        &self,
        _args: &[String],
        build_id: BuildId,
        _status: &mut StatusReport,
    ) -> Result<LaunchOutcome> {
        push(&self.log, "launch");
        self.seen_build_id.set(Some(build_id));
        match self.behavior {
            Behavior::Complete(code) => Ok(LaunchOutcome::Completed(code)),
            Behavior::Handoff => Ok(LaunchOutcome::RequestHandoff(test_handoff())),
            Behavior::DiskFull => Err(LauncherError::io(
                "failed to write build output",
                io::Error::from(io::ErrorKind::StorageFull),
            )),
        }
    }
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        push(&self.log, "release");
    }
}

struct UnsupportedTable;

impl ProcessTable for UnsupportedTable {
    fn supported(&self) -> bool {
        false
    }

    fn listing(&self) -> Result<String> {
        panic!("listing must not be read on an unsupported platform");
    }

    fn terminate(&self, _pid: u32) -> Result<()> {
        panic!("nothing may be terminated on an unsupported platform");
    }
}

struct FakeHost {
    /// `None` makes discovery fail.
    project_dir: Option<TempDir>,
    behavior: Behavior,
    interrupt_during_discovery: Option<Interrupt>,
    log: Log,
    seen_build_id: Rc<Cell<Option<BuildId>>>,
}

impl FakeHost {
    fn new(behavior: Behavior) -> Self {
        Self {
            project_dir: Some(create_test_project()),
            behavior,
            interrupt_during_discovery: None,
            log: Log::default(),
            seen_build_id: Rc::default(),
        }
    }

    fn without_project() -> Self {
        Self {
            project_dir: None,
            ..Self::new(Behavior::Complete(0))
        }
    }

    fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.log.borrow().iter().filter(|e| *e == entry).count()
    }
}

impl Host for FakeHost {
    fn install_signal_handlers(&mut self) {
        push(&self.log, "install_signal_handlers");
    }

    fn kill_all(&mut self, status: &mut StatusReport) -> Result<i32> {
        push(&self.log, "kill_all");
        crate::killall::kill_all_daemons(&UnsupportedTable, status)
    }

    fn discover_project(&mut self) -> Result<Project> {
        push(&self.log, "discover_project");
        if let Some(interrupt) = &self.interrupt_during_discovery {
            interrupt.raise();
        }
        match &self.project_dir {
            Some(dir) => Project::from_dir(dir.path()),
            None => Err(LauncherError::NoProjectRoot(PathBuf::from("/nowhere"))),
        }
    }

    fn resolve_repository<'p>(
        &mut self,
        _project: &'p Project,
        _tracer: &Tracer,
        _interrupt: &Interrupt,
    ) -> Result<Box<dyn Provider + 'p>> {
        push(&self.log, "acquire");
        Ok(Box::new(FakeProvider {
            behavior: self.behavior,
            log: Rc::clone(&self.log),
            seen_build_id: Rc::clone(&self.seen_build_id),
        }))
    }
}

/// What the reporter saw for one report call.
#[derive(Debug, Clone)]
struct Seen {
    exit_code: i32,
    message: Option<String>,
    build_id: BuildId,
    log_dir: Option<PathBuf>,
}

struct RecordingReporter {
    log: Log,
    reports: Vec<Seen>,
    fail: bool,
}

impl RecordingReporter {
    fn new(log: &Log) -> Self {
        Self {
            log: Rc::clone(log),
            reports: Vec::new(),
            fail: false,
        }
    }

    fn only(&self) -> &Seen {
        assert_eq!(self.reports.len(), 1, "expected exactly one report");
        &self.reports[0]
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&mut self, status: &StatusReport) -> Result<()> {
        push(&self.log, format!("report({})", status.exit_code));
        self.reports.push(Seen {
            exit_code: status.exit_code,
            message: status.status_message.clone(),
            build_id: status.build_id,
            log_dir: status.log_dir.clone(),
        });
        if self.fail {
            return Err(LauncherError::io(
                "status transport closed",
                io::Error::from(io::ErrorKind::BrokenPipe),
            ));
        }
        Ok(())
    }
}

fn run_with(host: &mut FakeHost, reporter: &mut RecordingReporter, args: &[&str]) -> RunResult {
    run(argv(args), host, reporter, &Interrupt::new())
}

#[test]
fn killall_unsupported_reports_generic_failure() {
    let mut host = FakeHost::new(Behavior::Complete(0));
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run_with(&mut host, &mut reporter, &["buck", "killall"]);

    assert_eq!(result.exit_code, exit_codes::FATAL_GENERIC);
    assert!(result.handoff.is_none());
    let seen = reporter.only();
    assert_eq!(seen.exit_code, exit_codes::FATAL_GENERIC);
    assert!(seen.message.as_deref().is_some_and(|m| !m.is_empty()));
    assert_eq!(host.entries(), vec!["kill_all", "report(10)"]);
}

#[test]
fn missing_project_is_commandline_error_without_trace() {
    let mut host = FakeHost::without_project();
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run_with(&mut host, &mut reporter, &["buck", "build"]);

    assert_eq!(result.exit_code, exit_codes::COMMANDLINE_ERROR);
    let seen = reporter.only();
    assert!(seen.message.is_some());
    assert!(seen.log_dir.is_none());
    assert_eq!(host.count("acquire"), 0);
}

#[test]
fn engine_exit_code_passes_through() {
    let mut host = FakeHost::new(Behavior::Complete(42));
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run_with(&mut host, &mut reporter, &["buck", "build", "//..."]);

    assert_eq!(result.exit_code, 42);
    assert!(reporter.only().message.is_none());
    assert_eq!(
        host.entries(),
        vec![
            "install_signal_handlers",
            "discover_project",
            "acquire",
            "launch",
            "release",
            "report(42)",
        ]
    );
}

#[test]
fn trace_is_keyed_by_the_build_id_given_to_the_provider() {
    let mut host = FakeHost::new(Behavior::Complete(0));
    let mut reporter = RecordingReporter::new(&host.log);

    run_with(&mut host, &mut reporter, &["buck", "build"]);

    let build_id = host.seen_build_id.get().unwrap();
    assert_eq!(reporter.only().build_id, build_id);

    let log_dir = reporter.only().log_dir.clone().unwrap();
    let project = Project::from_dir(host.project_dir.as_ref().unwrap().path()).unwrap();
    assert_eq!(log_dir, project.log_dir());
    let trace = Tracer::artifact_path(&project.trace_dir(), &build_id);
    let events: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&trace).unwrap()).unwrap();
    let names: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.first(), Some(&"main"));
    assert_eq!(names.last(), Some(&"main"));
    assert!(names.contains(&"discover_project"));
}

#[test]
fn handoff_is_returned_after_success_is_reported() {
    let mut host = FakeHost::new(Behavior::Handoff);
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run_with(&mut host, &mut reporter, &["buck", "run", "//app"]);
    // What main does with a hand-off.
    if result.handoff.is_some() {
        push(&host.log, "handoff");
    }

    assert_eq!(result.exit_code, exit_codes::SUCCESS);
    assert_eq!(result.handoff, Some(test_handoff()));
    let entries = host.entries();
    let report = entries.iter().position(|e| e == "report(0)").unwrap();
    let handoff = entries.iter().position(|e| e == "handoff").unwrap();
    assert!(report < handoff);
}

#[test]
fn interrupt_during_discovery_never_acquires_provider() {
    let interrupt = Interrupt::new();
    let mut host = FakeHost::new(Behavior::Complete(0));
    host.interrupt_during_discovery = Some(interrupt.clone());
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run(argv(&["buck", "build"]), &mut host, &mut reporter, &interrupt);

    assert_eq!(result.exit_code, exit_codes::SIGNAL_INTERRUPT);
    assert_eq!(host.count("acquire"), host.count("release"));
    assert_eq!(host.count("launch"), 0);
    assert_eq!(reporter.only().exit_code, exit_codes::SIGNAL_INTERRUPT);
}

#[test]
fn provider_is_released_once_on_failure() {
    let mut host = FakeHost::new(Behavior::DiskFull);
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run_with(&mut host, &mut reporter, &["buck", "build"]);

    assert_eq!(result.exit_code, exit_codes::FATAL_DISK_FULL);
    assert_eq!(host.count("acquire"), 1);
    assert_eq!(host.count("release"), 1);
    assert!(
        reporter
            .only()
            .message
            .as_deref()
            .is_some_and(|m| m.contains("failed to write build output"))
    );
}

#[test]
fn reporter_failure_keeps_exit_code() {
    let mut host = FakeHost::new(Behavior::Complete(7));
    let mut reporter = RecordingReporter::new(&host.log);
    reporter.fail = true;

    let result = run_with(&mut host, &mut reporter, &["buck", "test"]);

    assert_eq!(result.exit_code, 7);
    assert_eq!(reporter.reports.len(), 1);
}

#[test]
fn kill_stops_project_daemon_without_dispatch() {
    let mut host = FakeHost::new(Behavior::Complete(99));
    let mut reporter = RecordingReporter::new(&host.log);

    let result = run_with(&mut host, &mut reporter, &["buck", "kill"]);

    assert_eq!(result.exit_code, exit_codes::SUCCESS);
    assert_eq!(host.count("kill_build_daemon"), 1);
    assert_eq!(host.count("launch"), 0);
    assert_eq!(host.count("release"), 1);
    assert_eq!(reporter.only().exit_code, 0);
}

#[test]
#[serial_test::serial]
fn system_host_discovers_project_from_working_directory() {
    let temp_dir = create_test_project();
    let _guard = crate::test_support::DirGuard::new(temp_dir.path());

    let project = SystemHost::default().discover_project().unwrap();
    assert!(project.root.join(crate::project::PROJECT_MARKER).is_file());
}
