//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::result::{CommandResult, ToolCommand};
use crate::traits::CommandExecutor;

/// Local command executor
///
/// Spawns tools on this node with `tokio::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, cmd), fields(command = %cmd), level = "debug")]
    async fn execute(&self, cmd: &ToolCommand) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        let child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError {
                program: cmd.program.clone(),
                reason: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(status, duration = ?duration, "command completed");

        if !output.status.success() {
            error!(status, stderr = %stderr.trim(), "command failed");
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn run(&self, cmd: &ToolCommand) -> Result<CommandResult, ExecError> {
        self.execute(cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_success() {
        let executor = LocalExecutor::new();
        let result = executor.run(&sh("echo hello")).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_failure_is_reported_in_status() {
        let executor = LocalExecutor::new();
        let result = executor.run(&sh("exit 42")).await.unwrap();

        assert!(!result.success());
        assert_eq!(result.status, 42);
    }

    #[tokio::test]
    async fn test_args_are_not_shell_expanded() {
        let executor = LocalExecutor::new();
        let result = executor
            .run(&ToolCommand::new("echo").arg("$HOME *"))
            .await
            .unwrap();

        assert_eq!(result.stdout.trim(), "$HOME *");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let executor = LocalExecutor::new();
        let result = executor
            .run(&ToolCommand::new("poolpatch-definitely-missing-tool"))
            .await;

        assert!(matches!(result, Err(ExecError::SpawnError { .. })));
    }
}
