//! External command execution.
//!
//! Commands are always built from an argument vector and never passed
//! through a shell, so usernames can't be interpreted as shell syntax.
//! Secrets travel on stdin and are redacted from `Debug` output.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::CommandError;

/// Maximum stderr kept in error messages.
const MAX_ERROR_OUTPUT: usize = 400;

/// A program invocation: program, argument vector and optional stdin.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<SecretString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the child's stdin.
    pub fn stdin(mut self, input: SecretString) -> Self {
        self.stdin = Some(input);
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
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Short description of a failure, for error messages.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            format!(
                "exit code {}: {}",
                self.exit_code,
                truncate_for_error(stderr)
            )
        }
    }
}

/// Runs external programs to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command, capturing stdout and stderr.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Run a command attached to the controlling terminal and return its exit code.
    async fn run_interactive(&self, spec: &CommandSpec) -> Result<i32, CommandError>;
}

/// Runs commands on the host through `tokio::process`.
#[derive(Debug, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %spec, "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        if let Some(input) = &spec.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(input.expose_secret().as_bytes())
                .await
                .map_err(|source| CommandError::Io {
                    program: spec.program.clone(),
                    source,
                })?;
            // Dropping stdin closes the pipe so the child sees EOF.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CommandError::Io {
                program: spec.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !result.success() {
            tracing::debug!(
                command = %spec,
                exit_code = result.exit_code,
                stderr = %truncate_for_error(result.stderr.trim()),
                "Command failed"
            );
        }

        Ok(result)
    }

    async fn run_interactive(&self, spec: &CommandSpec) -> Result<i32, CommandError> {
        tracing::debug!(command = %spec, "Running interactive command");

        let status = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// Truncate command output for error messages (UTF-8 safe).
fn truncate_for_error(s: &str) -> String {
    if s.chars().count() <= MAX_ERROR_OUTPUT {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(MAX_ERROR_OUTPUT).collect::<String>())
    }
}
