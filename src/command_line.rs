//! Shape of a forwarded command line.
//!
//! The launcher never interprets the build command itself, but a few
//! decisions depend on its shape: `clean` restarts the daemon, help output
//! skips it, and `--version` is answered locally.

/// A forwarded command line split into launcher options, command and
/// command options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLineArgs {
    /// Options before the command, e.g. `--version`.
    pub buck_options: Vec<String>,
    /// First non-option argument.
    pub command: Option<String>,
    /// Everything after the command.
    pub command_options: Vec<String>,
}

impl CommandLineArgs {
    /// Split `args` (without the program name).
    pub fn parse(args: &[String]) -> Self {
        let mut parsed = Self::default();

        for arg in args {
            if parsed.command.is_some() {
                parsed.command_options.push(arg.clone());
            } else if arg.starts_with('-') {
                parsed.buck_options.push(arg.clone());
            } else {
                parsed.command = Some(arg.clone());
            }
        }

        parsed
    }

    /// Whether this invocation only prints help.
    ///
    /// `buck --help clean` is not a help command; `buck --version` is.
    pub fn is_help(&self) -> bool {
        self.command.is_none() || self.command_options.iter().any(|o| o == "--help")
    }

    /// Whether this invocation only asks for the version.
    pub fn is_version(&self) -> bool {
        self.command.is_none()
            && self
                .buck_options
                .iter()
                .any(|o| o == "--version" || o == "-V")
    }

    pub fn is_command(&self, name: &str) -> bool {
        self.command.as_deref() == Some(name)
    }
}
