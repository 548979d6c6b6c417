//! External helper processes.
//!
//! Helpers are launched with no arguments beyond their configured argv and
//! awaited asynchronously so the session loop keeps running. There is no
//! cancellation: a launched helper runs until it exits or its own timeout
//! expires, at which point the child is killed.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Build from a configured argv. Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            env: Vec::new(),
            timeout: None,
        })
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Zero means no limit.
    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.timeout = (millis > 0).then(|| Duration::from_millis(millis));
        self
    }
}

/// Exit status and captured streams of a finished helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Diagnostic text for logs: stderr, or the exit code when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Launch `spec` and wait for it to exit.
pub async fn run_command(spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %spec.program, args = ?spec.args, "launching helper");

    let output = command.output();
    let output = match spec.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, output).await {
            Ok(result) => result,
            Err(_) => {
                return Err(ProcessError::TimedOut {
                    program: spec.program.clone(),
                    timeout,
                })
            }
        },
        None => output.await,
    }
    .map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let result = ProcessOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(program = %spec.program, exit_code = ?result.exit_code, "helper finished");
    Ok(result)
}
