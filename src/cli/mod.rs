//! Command-line parsing for the launcher.
//!
//! The launcher owns only two keywords, `killall` and `kill`, and only when
//! they are the sole argument. Everything else, including `--help` and
//! `--version`, is forwarded untouched to the engine.

use clap::Parser;
use std::ffi::{OsStr, OsString};
use tracing::debug;

/// Keyword terminating every daemon on the machine.
pub const KILLALL_KEYWORD: &str = "killall";

/// Keyword terminating the current project's daemon.
pub const KILL_KEYWORD: &str = "kill";

/// Bootstrap launcher for the buck build tool.
#[derive(Parser, Debug)]
#[command(name = "buck")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Arguments forwarded to the build engine.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..,
        value_parser = clap::value_parser!(OsString)
    )]
    pub args: Vec<OsString>,
}

impl Cli {
    /// The process arguments, program name first.
    pub fn argv() -> Vec<String> {
        Self::argv_from(std::env::args_os())
    }

    /// Convert a raw command line into the launcher's argv.
    ///
    /// Never fails: arguments that are not valid UTF-8 are converted lossily
    /// and forwarded, so every invocation reaches the launcher and is reported.
    pub fn argv_from<I, T>(raw: I) -> Vec<String>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let raw: Vec<OsString> = raw.into_iter().map(Into::into).collect();
        let program = raw
            .first()
            .map(|arg0| lossy(arg0))
            .unwrap_or_else(|| "buck".to_string());

        let args = match Self::try_parse_from(raw.iter().cloned()) {
            Ok(cli) => cli.args,
            Err(e) => {
                debug!("forwarding raw arguments: {}", e);
                raw.into_iter().skip(1).collect()
            }
        };

        std::iter::once(program)
            .chain(args.iter().map(|arg| lossy(arg)))
            .collect()
    }
}

fn lossy(arg: &OsStr) -> String {
    arg.to_string_lossy().into_owned()
}

/// What the launcher has been asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `killall`: terminate all daemons, no project needed.
    KillAll,
    /// `kill`: terminate this project's daemon.
    KillDaemon,
    /// Anything else, forwarded to the engine.
    Forward(Vec<String>),
}

impl Invocation {
    /// Classify `args` (without the program name).
    pub fn classify(args: &[String]) -> Self {
        match args {
            [only] if only == KILLALL_KEYWORD => Self::KillAll,
            [only] if only == KILL_KEYWORD => Self::KillDaemon,
            _ => Self::Forward(args.to_vec()),
        }
    }
}
