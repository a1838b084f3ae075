//! External command execution with a hard timeout.
//!
//! Every live remediation goes through a `CommandRunner`. The real runner
//! spawns through tokio and kills the child when the timeout elapses; the
//! scripted runner answers from a table so executor logic can be tested
//! without touching the host.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn exit(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, trimmed
    pub fn combined(&self) -> String {
        let joined = format!("{}\n{}", self.stdout.trim(), self.stderr.trim());
        joined.trim().to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Execution timed out after {0}s.")]
    Timeout(u64),

    #[error("Execution failed: {0}")]
    Spawn(String),
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, RunError>;
}

/// Runs real commands, bounded by `timeout`
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, RunError> {
        debug!("Executing: {} {:?}", program, args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match timeout(self.timeout, child).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(RunError::Spawn(format!("{}: {}", program, e))),
            Err(_) => {
                warn!("{} timed out after {:?}", program, self.timeout);
                Err(RunError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

/// Answers commands from a table keyed by program name and records every call
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, Result<CommandOutput, RunError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unscripted programs succeed with empty output
    pub fn respond(self, program: &str, response: Result<CommandOutput, RunError>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(program.to_string(), response);
        }
        self
    }

    /// Every command line seen so far, "program arg arg"
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn was_called(&self, program: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c.split_whitespace().next() == Some(program))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, RunError> {
        if let Ok(mut calls) = self.calls.lock() {
            let mut line = program.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            calls.push(line);
        }
        self.responses
            .lock()
            .ok()
            .and_then(|r| r.get(program).cloned())
            .unwrap_or_else(|| Ok(CommandOutput::ok("")))
    }
}
