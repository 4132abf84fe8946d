//! Shell command action.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use super::arg;
use crate::context::ActionContext;
use crate::error::AppError;
use crate::registry::{ActionOutput, AppAction};
use crate::schema::{ArgumentMap, ParamType, ParameterSchema, ParameterSpec};

/// Runs `command` through a shell and returns its exit code and output.
///
/// A non-zero exit code fails the action unless `allow_failure` is set.
pub struct ShellAction {
    shell: String,
}

impl ShellAction {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different shell binary.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    async fn run(
        &self,
        command: &str,
        cwd: Option<&str>,
        env: &HashMap<String, String>,
        timeout_duration: Option<Duration>,
    ) -> Result<(i32, String, String), AppError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        cmd.kill_on_drop(true);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::Process(format!("Failed to spawn process: {}", e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Read both streams concurrently so a full pipe cannot stall the child.
        let stdout_handle = tokio::spawn(async move {
            let mut output = String::new();
            if let Some(stdout) = stdout {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    output.push_str(&line);
                    output.push('\n');
                }
            }
            output
        });
        let stderr_handle = tokio::spawn(async move {
            let mut output = String::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    output.push_str(&line);
                    output.push('\n');
                }
            }
            output
        });

        let status = match timeout_duration {
            Some(duration) => match timeout(duration, child.wait()).await {
                Ok(result) => result?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(AppError::Timeout(duration.as_millis() as u64));
                }
            },
            None => child.wait().await?,
        };

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();
        Ok((status.code().unwrap_or(-1), stdout, stderr))
    }
}

impl Default for ShellAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppAction for ShellAction {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(ParameterSpec::required("command", ParamType::String))
            .with(ParameterSpec::optional("cwd", ParamType::String))
            .with(ParameterSpec::optional("env", ParamType::Object))
            .with(ParameterSpec::optional("timeout_ms", ParamType::Integer))
            .with(
                ParameterSpec::optional("allow_failure", ParamType::Boolean)
                    .with_default(json!(false)),
            )
    }

    async fn execute(
        &self,
        args: &ArgumentMap,
        ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError> {
        let command = arg(args, "command")?
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("command must be a string".to_string()))?;
        let cwd = args.get("cwd").and_then(Value::as_str);
        let env: HashMap<String, String> = args
            .get("env")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default();
        let timeout_duration = args
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis);
        let allow_failure = args
            .get("allow_failure")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        tracing::debug!(
            execution_id = %ctx.execution_id,
            action = %ctx.action_id,
            command,
            "Running shell command"
        );

        let (exit_code, stdout, stderr) = self.run(command, cwd, &env, timeout_duration).await?;

        if exit_code != 0 && !allow_failure {
            return Err(AppError::ExecutionFailed(format!(
                "command exited with code {}: {}",
                exit_code,
                stderr.trim()
            )));
        }

        Ok(ActionOutput::Complete(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        })))
    }
}
