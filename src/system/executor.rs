// src/system/executor.rs

use crate::CancellationToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a command did not run to a successful exit.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Unbalanced quotes in a command line.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    /// `from_args` got no program.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The program could not be spawned.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    /// The program exited unsuccessfully; `stderr` is empty unless piped.
    #[error("Command '{command}' exited with status {code:?}.{}", tail(.stderr))]
    NonZeroExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    /// Killed after exceeding its time limit.
    #[error("Command '{command}' did not finish within {}s.", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
    /// The cancellation token was set; the child was killed.
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

fn tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let start = lines.len().saturating_sub(10);
    format!("\n{}", lines.get(start..).unwrap_or_default().join("\n"))
}

/// Where a child's output goes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// Shared with the current terminal.
    #[default]
    Inherit,
    /// Captured and returned in [`CommandOutput`].
    Pipe,
}

/// An explicit program invocation. Arguments are never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Resolved through `PATH`.
    pub program: String,
    pub args: Vec<String>,
    /// Where stdout and stderr go.
    pub stdio: StdioMode,
    /// Added to the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Builds a spec from `[program, args...]`.
    pub fn from_args<S: AsRef<str>>(parts: &[S]) -> Result<Self, ExecutionError> {
        let (program, args) = parts.split_first().ok_or(ExecutionError::EmptyCommand)?;
        if program.as_ref().trim().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        Ok(Self {
            program: program.as_ref().to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            stdio: StdioMode::Inherit,
            env: BTreeMap::new(),
        })
    }

    /// Splits a command line with shell quoting rules (no shell is involved).
    pub fn parse(command_line: &str) -> Result<Self, ExecutionError> {
        let parts = shlex::split(command_line.trim())
            .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?;
        Self::from_args(&parts)
    }

    pub fn stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Replaces `placeholder` in every argument.
    pub fn substitute(mut self, placeholder: &str, value: &str) -> Self {
        for arg in &mut self.args {
            *arg = arg.replace(placeholder, value);
        }
        self
    }

    pub(crate) fn to_command(&self, cwd: &Path) -> StdCommand {
        let mut command = StdCommand::new(&self.program);
        command
            .args(&self.args)
            .current_dir(dunce::simplified(cwd))
            .envs(&self.env);
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        f.write_str(&shlex::try_join(parts).unwrap_or_else(|_| self.program.clone()))
    }
}

/// What a finished command produced. Streams are empty in `Inherit` mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `spec` in `cwd` until it exits, is cancelled or exceeds `timeout`.
///
/// A non-zero exit is an error carrying the captured stderr.
pub fn execute(
    spec: &CommandSpec,
    cwd: &Path,
    timeout: Option<Duration>,
    cancellation_token: &CancellationToken,
) -> Result<CommandOutput, ExecutionError> {
    if cancellation_token.load(Ordering::SeqCst) {
        return Err(ExecutionError::Cancelled);
    }
    let command_line = spec.to_string();
    log::trace!("Executing '{}' in '{}'", command_line, cwd.display());

    let mut child = spawn(spec, cwd, &command_line)?;
    let readers = (
        child.stdout.take().map(drain),
        child.stderr.take().map(drain),
    );

    // Non-blocking wait loop to allow for cancellation and timeouts.
    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if cancellation_token.load(Ordering::SeqCst) {
                    log::debug!("Cancellation requested, killing child process (PID: {})...", child.id());
                    kill(&mut child);
                    return Err(ExecutionError::Cancelled);
                }
                if let Some(limit) = timeout
                    && started.elapsed() > limit
                {
                    log::debug!("'{}' exceeded {:?}, killing it", command_line, limit);
                    kill(&mut child);
                    return Err(ExecutionError::TimedOut {
                        command: command_line,
                        timeout: limit,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(ExecutionError::CommandFailed(command_line, e)),
        }
    };

    let output = CommandOutput {
        code: status.code(),
        stdout: join(readers.0),
        stderr: join(readers.1),
    };
    if !status.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: command_line,
            code: output.code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

fn spawn(spec: &CommandSpec, cwd: &Path, command_line: &str) -> Result<Child, ExecutionError> {
    let configure = |command: &mut StdCommand| {
        match spec.stdio {
            StdioMode::Inherit => command.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
            StdioMode::Pipe => command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped()),
        };
    };

    let mut command = spec.to_command(cwd);
    configure(&mut command);
    match command.spawn() {
        Ok(child) => Ok(child),
        // Package manager shims are `.cmd` files on Windows; retry through cmd /C.
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", spec.program);
            let mut fallback = StdCommand::new("cmd");
            fallback
                .arg("/C")
                .arg(&spec.program)
                .args(&spec.args)
                .current_dir(dunce::simplified(cwd))
                .envs(&spec.env);
            configure(&mut fallback);
            fallback
                .spawn()
                .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))
        }
        Err(e) => Err(ExecutionError::CommandFailed(command_line.to_string(), e)),
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill child process {}: {}", child.id(), e);
    }
    child.wait().ok();
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).ok();
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
