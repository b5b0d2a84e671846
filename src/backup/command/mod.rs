pub mod decode;
pub mod log;
pub mod runner;

use crate::backup::redacted::RedactedString;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// One argument of an external command. Secrets are passed to the child as is
/// but printed redacted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandArg {
    Plain(String),
    Secret(RedactedString),
}

impl Display for CommandArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandArg::Plain(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                write!(f, "\"{}\"", s)
            }
            CommandArg::Plain(s) => write!(f, "{}", s),
            CommandArg::Secret(s) => write!(f, "{}", s),
        }
    }
}

/// An external command to run, with a label for reports and an optional timeout.
///
/// `timeout: None` waits for the child however long it takes.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<CommandArg>,
    description: String,
    timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(program: P, description: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
            timeout: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(CommandArg::Plain(arg.into()));
        self
    }

    pub fn args<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.args
            .extend(args.into_iter().map(|a| CommandArg::Plain(a.into())));
        self
    }

    pub fn secret(mut self, secret: &RedactedString) -> Self {
        self.args.push(CommandArg::Secret(secret.clone()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// The command line as shown in logs and mails, with secrets redacted.
    pub fn command_line(&self) -> String {
        std::iter::once(CommandArg::Plain(self.program.display().to_string()))
            .chain(self.args.iter().cloned())
            .join(" ")
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        for arg in &self.args {
            match arg {
                CommandArg::Plain(s) => command.arg(s),
                CommandArg::Secret(s) => command.arg(s.inner()),
            };
        }
        // own process group, so a timeout can kill helpers the tool forks
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }
}
