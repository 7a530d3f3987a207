//! Shell execution tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use agent_core::tool::{ParameterSchema, Tool, ToolArgs, ToolError, ToolSchema};

/// Runs a shell command with a bounded timeout and reports the exit code
/// plus combined stdout/stderr.
pub struct RunShellTool {
    timeout: Duration,
}

impl RunShellTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for RunShellTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "run_shell".into(),
            description: format!(
                "Execute a shell command inside the current workspace (timeout {}s). \
                 Commands run in a Linux environment and must not be interactive.",
                self.timeout.as_secs()
            ),
            parameters: vec![ParameterSchema {
                name: "command".into(),
                param_type: "string".into(),
                description: "Shell command string".into(),
                required: true,
            }],
        }
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("'command' must be a string".into()))?;

        tracing::debug!(%command, "running shell command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Err(_) => return Err(ToolError::Execution("command timed out".into())),
            Ok(Err(err)) => {
                return Err(ToolError::Execution(format!(
                    "failed to start command: {err}"
                )));
            }
            Ok(Ok(output)) => output,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        let mut report = format!("exit code {exit_code}");
        if !stdout.is_empty() {
            report.push('\n');
            report.push_str(&stdout);
        }
        if !stderr.is_empty() {
            report.push_str("\n[stderr]\n");
            report.push_str(&stderr);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &str) -> ToolArgs {
        let mut args = ToolArgs::new();
        args.insert("command".into(), serde_json::json!(command));
        args
    }

    #[tokio::test]
    async fn test_reports_exit_code_and_output() {
        let tool = RunShellTool::new(Duration::from_secs(10));
        let report = tool.execute(&args("echo hello")).await.unwrap();
        assert!(report.starts_with("exit code 0"));
        assert!(report.contains("hello"));
    }

    #[tokio::test]
    async fn test_captures_stderr() {
        let tool = RunShellTool::new(Duration::from_secs(10));
        let report = tool.execute(&args("echo oops >&2; exit 3")).await.unwrap();
        assert!(report.starts_with("exit code 3"));
        assert!(report.contains("[stderr]"));
        assert!(report.contains("oops"));
    }

    #[tokio::test]
    async fn test_timeout_is_soft_error() {
        let tool = RunShellTool::new(Duration::from_millis(50));
        let err = tool.execute(&args("sleep 5")).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_command_argument() {
        let tool = RunShellTool::new(Duration::from_secs(10));
        let err = tool.execute(&ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
