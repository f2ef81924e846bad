//! Subprocess execution.
//!
//! Every external tool the hooks touch (`apt`, `dpkg`, `systemctl`, `npm` and
//! the orchestrator's hook tools) goes through a [`CommandRunner`], so the
//! handlers can be exercised without a real host. Calls are blocking from the
//! handler's point of view and carry no timeout.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// A command line to run, optionally in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,
    /// Arguments, passed without shell interpretation
    pub args: Vec<String>,
    /// Working directory; inherited when `None`
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// `program` with `args`, run from the current directory.
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Runs the command from `dir` instead of the current directory.
    #[must_use]
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run that printed `stdout`.
    #[must_use]
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// A run that exited with `code`.
    #[must_use]
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Runs external commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` and captures its output. A non-zero exit is reported in
    /// [`CommandOutput::success`], not as an error; only failing to start the
    /// process is an error.
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands on the local host with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec, "Running command");
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|source| Error::CommandSpawn {
            command: spec.to_string(),
            source,
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `spec` and fails unless it exits successfully.
pub async fn check_call(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<()> {
    check_output(runner, spec).await.map(|_| ())
}

/// Runs `spec`, fails unless it exits successfully, and returns its stdout.
pub async fn check_output(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<String> {
    let output = runner.output(spec).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(Error::CommandFailed {
            command: spec.to_string(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}
