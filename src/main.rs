//! Buck launcher: finds the project, picks the engine and hands it the
//! command line.
//!
//! This is the entry point for the `buck` binary. It collects arguments, runs
//! the launcher, and exits with a code from [`exit_codes`], unless a
//! successful `buck run` replaces this process with the built target.

mod cli;
mod command_line;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod git;
pub mod killall;
mod launcher;
mod logging;
pub mod process;
pub mod project;
pub mod repository;
pub mod status;
pub mod trace;

#[cfg(test)]
mod test_support;

use cli::Cli;
use launcher::SystemHost;
use process::Interrupt;
use status::LogStatusReporter;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init_logging();

    let argv = Cli::argv();

    let result = launcher::run(
        argv,
        &mut SystemHost::default(),
        &mut LogStatusReporter,
        &Interrupt::global(),
    );

    match result.handoff {
        Some(handoff) => {
            let err = process::replace_current_process(&handoff);
            eprintln!("Error: {}", err);
            exit(err.exit_code())
        }
        None => exit(result.exit_code),
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(exit_codes::to_process_byte(code))
}
