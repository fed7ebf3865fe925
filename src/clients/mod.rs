//! Device clients
//!
//! Thin wrappers around existing tools and libraries: the `adb` and
//! `ssh`/`scp` binaries, a TCP connection to the console terminal server,
//! and reqwest for the on-device REST services.

mod adb;
mod rest;
mod serial;
mod ssh;

pub use adb::AdbClient;
pub use rest::{AppStatus, RestClient, RestError, RestRequest, RestResponse};
pub use serial::SerialClient;
pub use ssh::{SshClient, SshConfig};

use anyhow::{Context, Result};
use std::fmt;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a shell command
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn lines(&self) -> Vec<&str> {
        self.stdout.lines().collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    /// Trimmed stdout
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }
}

/// Program invocation. `env` entries reach the child process only and are
/// never part of the logged form.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Run `command` and capture its output, bounded by `timeout`
pub(crate) async fn run_command(
    command: &ShellCommand,
    timeout: Duration,
) -> Result<CommandOutput> {
    debug!("Running {}", command);
    let program = &command.program;

    let output = tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output(),
    )
    .await
    .with_context(|| format!("{program} timed out after {}s", timeout.as_secs()))?
    .with_context(|| format!("Failed to execute {program}"))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
