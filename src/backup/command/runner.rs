use crate::backup::command::decode::TextDecoder;
use crate::backup::command::log::CommandLog;
use crate::backup::command::CommandSpec;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::failure::FailureCategory;
use crate::backup::result_error::result::{escalate, Result};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use derive_more::Display;
use function_name::named;
use getset::Getters;
use std::io::Read;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How a command ended. Exactly one of the two always holds.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CommandOutcome {
    #[display("exit code {_0}")]
    Exited(i32),
    #[display("timed out after {_0:?}, killed")]
    TimedOut(Duration),
}

#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct CommandResult {
    description: String,
    command_line: String,
    outcome: CommandOutcome,
    stdout: String,
    stderr: String,
}

impl CommandResult {
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            CommandOutcome::Exited(code) => Some(code),
            CommandOutcome::TimedOut(_) => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, CommandOutcome::TimedOut(_))
    }

    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

/// Runs external commands for one backup run, recording each of them in the
/// cumulative command log.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    log: CommandLog,
    decoder: TextDecoder,
    poll_interval: Duration,
}

impl CommandRunner {
    pub fn new(log: CommandLog, decoder: TextDecoder) -> Self {
        Self {
            log,
            decoder,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Runs the command and escalates anything but a zero exit.
    ///
    /// A spawn failure, a non-zero exit and a timeout all come back as
    /// `Error::Failure`, after the output has been written to the command log.
    pub fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        info!("Running: {}", spec.description());
        let result = self.execute(spec)?;
        self.log.append_result(&result)?;

        let detail = format!("The command was:\n{}", result.command_line());
        match result.outcome() {
            CommandOutcome::Exited(0) => {
                info!("{} finished", spec.description());
                Ok(result)
            }
            CommandOutcome::Exited(code) => {
                warn!("{} failed with exit code {}", spec.description(), code);
                escalate(
                    FailureCategory::CommandError,
                    spec.description(),
                    format!("{detail}\n\nExit code: {code}"),
                )
            }
            CommandOutcome::TimedOut(timeout) => {
                warn!("{} timed out after {:?}", spec.description(), timeout);
                escalate(
                    FailureCategory::CommandTimeout,
                    spec.description(),
                    format!("{detail}\n\nNo exit after {timeout:?}, the process was killed."),
                )
            }
        }
    }

    /// Runs the command to completion or timeout without judging the outcome.
    #[named]
    pub fn execute(&self, spec: &CommandSpec) -> Result<CommandResult> {
        let command_line = spec.command_line();
        debug!("$ {}", command_line);

        let mut child = match spec
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.log
                    .append_spawn_error(spec.description(), &command_line, &e)?;
                return escalate(
                    FailureCategory::CommandError,
                    spec.description(),
                    format!("The command was:\n{command_line}\n\nFailed to start: {e}"),
                );
            }
        };

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let outcome = self
            .wait(&mut child, spec.timeout_duration())
            .with_msg(format!("Waiting for {:?} failed", spec.description()))
            .with_debug_object_and_fn_name(command_line.clone(), function_path!())?;

        // after a kill, anything that escaped the process group may still hold the pipes
        let drain_until = match outcome {
            CommandOutcome::TimedOut(_) => Some(Instant::now() + DRAIN_GRACE),
            CommandOutcome::Exited(_) => None,
        };
        let stdout = collect_output(stdout_reader, drain_until)?;
        let stderr = collect_output(stderr_reader, drain_until)?;
        let stdout = self.decoder.decode(&stdout).into_owned();
        let stderr = self.decoder.decode(&stderr).into_owned();
        stdout.lines().for_each(|line| debug!("| {}", line));

        Ok(CommandResult {
            description: spec.description().to_owned(),
            command_line,
            outcome,
            stdout,
            stderr,
        })
    }

    fn wait(&self, child: &mut Child, timeout: Option<Duration>) -> Result<CommandOutcome> {
        let Some(timeout) = timeout else {
            return Ok(CommandOutcome::Exited(exit_code(child.wait()?)));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(CommandOutcome::Exited(exit_code(status)));
            }
            let now = Instant::now();
            if now >= deadline {
                kill_tree(child)?;
                child.wait()?;
                return Ok(CommandOutcome::TimedOut(timeout));
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

type OutputChunks = Receiver<std::io::Result<Vec<u8>>>;

/// Streams a pipe into a channel chunk by chunk. The channel disconnects at EOF.
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<OutputChunks> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        rx
    })
}

/// Collects a reader's output until EOF, or until `until` has passed. A reader
/// still blocked then is abandoned with whatever it delivered so far.
fn collect_output(reader: Option<OutputChunks>, until: Option<Instant>) -> Result<Vec<u8>> {
    let Some(rx) = reader else {
        return Ok(Vec::new());
    };
    let mut output = Vec::new();
    loop {
        let next = match until {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(until) => rx.recv_timeout(until.saturating_duration_since(Instant::now())),
        };
        match next {
            Ok(chunk) => output.extend(
                chunk
                    .map_err(Error::from)
                    .with_msg("Reading command output failed")?,
            ),
            Err(RecvTimeoutError::Disconnected) => return Ok(output),
            Err(RecvTimeoutError::Timeout) => {
                warn!("Output pipe still open after the command was killed, giving up on it");
                return Ok(output);
            }
        }
    }
}

/// Kills the child and every process in its group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill has no memory effects; the group was created for this child
    // and cannot be reused while the child is unreaped.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            return Err(Error::from(e).with_msg(format!("Failed to kill process group {}", pgid)));
        }
    }
    Ok(())
}

/// Kills the child and its descendants.
#[cfg(windows)]
fn kill_tree(child: &mut Child) -> Result<()> {
    let tree_killed = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &child.id().to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !tree_killed {
        kill_child(child)?;
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(child: &mut Child) -> Result<()> {
    kill_child(child)
}

#[cfg(not(unix))]
fn kill_child(child: &mut Child) -> Result<()> {
    match child.kill() {
        // already exited between try_wait and kill
        Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
