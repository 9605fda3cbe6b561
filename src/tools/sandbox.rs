use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::core::error::{Result, SandchatError};
use crate::core::utils::path_key;

/// Result of executing a code snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Runs code on behalf of a session.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, session: &str, code: &str) -> Result<ExecutionResult>;
}

/// Executes code by piping it into an interpreter process.
///
/// Each session gets its own working directory under `root`, so files
/// written by one execution are visible to the next in the same session.
pub struct ProcessExecutor {
    command: Vec<String>,
    root: PathBuf,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(command: Vec<String>, root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        if command.is_empty() {
            return Err(SandchatError::Config(
                "sandbox command must not be empty".to_string(),
            ));
        }
        Ok(Self {
            command,
            root: root.into(),
            timeout,
        })
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(path_key(session))
    }

    async fn spawn_in(&self, workdir: &Path, code: &str) -> Result<ExecutionResult> {
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandchatError::Sandbox(format!("failed to spawn {}: {e}", self.command[0]))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let code = code.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(code.as_bytes()).await {
                    debug!(error = %e, "sandbox.stdin.closed_early");
                }
            });
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(SandchatError::Sandbox(format!(
                "error waiting for process: {e}"
            ))),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "sandbox.timeout");
                Ok(ExecutionResult {
                    stdout: String::new(),
                    stderr: format!(
                        "execution timed out after {}s",
                        self.timeout.as_secs_f64()
                    ),
                    exit_code: -1,
                    timed_out: true,
                })
            }
        }
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    #[instrument(skip_all, fields(session = %session, code_len = code.len()))]
    async fn execute(&self, session: &str, code: &str) -> Result<ExecutionResult> {
        let workdir = self.session_dir(session);
        tokio::fs::create_dir_all(&workdir).await?;
        let result = self.spawn_in(&workdir, code).await?;
        debug!(
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "sandbox.executed"
        );
        Ok(result)
    }
}

/// Combined output for the model: stdout, then stderr, or a placeholder.
pub fn format_output(result: &ExecutionResult) -> String {
    let mut parts = Vec::new();
    if !result.stdout.is_empty() {
        parts.push(result.stdout.trim_end().to_string());
    }
    if !result.stderr.is_empty() {
        parts.push(format!("[stderr] {}", result.stderr.trim_end()));
    }
    if parts.is_empty() {
        "(no output)".to_string()
    } else {
        parts.join("\n")
    }
}
