//! Running command lines as external processes.
//!
//! The resolver only ever talks to a [`CommandRunner`]. [`ShellRunner`]
//! hands each line to the platform shell and blocks until it exits;
//! [`RecordingRunner`] spawns nothing and is used for dry runs.

use crate::{BuildError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// What a finished process reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// A successful exit with no output.
    pub fn ok() -> Self {
        Self {
            status: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Captured stdout and stderr, or `None` if both are blank.
    pub fn diagnostics(&self) -> Option<String> {
        let text = [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Runs one command line and waits for it.
///
/// An `Err` is returned only when the process could not be started
/// (`ProcessSpawnFailure`); a non-zero exit is a normal [`ProcessOutput`].
pub trait CommandRunner {
    fn run(&mut self, command: &str) -> Result<ProcessOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, command: &str) -> Result<ProcessOutput> {
        (**self).run(command)
    }
}

/// Runs command lines through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every command from this directory.
    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> Result<ProcessOutput> {
        let (shell, shell_flag) = get_shell();

        let mut cmd = Command::new(shell);
        cmd.arg(shell_flag).arg(command);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(shell = %shell, working_dir = ?self.working_dir, "spawning process");

        let output = cmd.output().map_err(|source| BuildError::ProcessSpawnFailure {
            command: command.to_string(),
            source,
        })?;

        let result = ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.stderr.is_empty() {
            debug!(stderr = %result.stderr, "command stderr");
        }
        if !result.stdout.is_empty() {
            debug!(stdout = %result.stdout, "command stdout");
        }

        // Shells report a missing program as 127 (sh) or 9009 (cmd).
        if is_missing_program(result.status) {
            return Err(BuildError::ProcessSpawnFailure {
                command: command.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    result.stderr.trim().to_string(),
                ),
            });
        }

        Ok(result)
    }
}

fn is_missing_program(status: Option<i32>) -> bool {
    if cfg!(windows) {
        status == Some(9009)
    } else {
        status == Some(127)
    }
}

/// Shell executable and the flag that passes it a command string.
fn get_shell() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd.exe", "/C")
    } else {
        ("/bin/sh", "-c")
    }
}

/// Records command lines instead of running them.
///
/// Every line succeeds unless it contains a needle registered with
/// [`fail_on`](Self::fail_on) or [`fail_to_spawn`](Self::fail_to_spawn).
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    commands: Vec<String>,
    fail_on: Vec<String>,
    unspawnable: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines containing `needle` exit with status 1.
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Lines containing `needle` cannot be started.
    pub fn fail_to_spawn(mut self, needle: impl Into<String>) -> Self {
        self.unspawnable.push(needle.into());
        self
    }

    /// Every line issued so far, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, command: &str) -> Result<ProcessOutput> {
        self.commands.push(command.to_string());

        if self.unspawnable.iter().any(|n| command.contains(n.as_str())) {
            return Err(BuildError::ProcessSpawnFailure {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            });
        }

        if self.fail_on.iter().any(|n| command.contains(n.as_str())) {
            return Ok(ProcessOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: format!("error: {}", command),
            });
        }

        Ok(ProcessOutput::ok())
    }
}
