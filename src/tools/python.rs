//! Python execution for the coder worker.

use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const PYTHON_REPL_TOOL: &str = "python_repl";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runs a Python snippet in a fresh interpreter process
pub struct PythonReplTool {
    interpreter: String,
    timeout: Duration,
}

impl PythonReplTool {
    pub fn new() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PythonReplTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for PythonReplTool {
    fn name(&self) -> &str {
        PYTHON_REPL_TOOL
    }

    fn description(&self) -> &str {
        "Execute Python code for data processing and calculations. Print results to see them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidInput("Missing 'code' parameter".to_string()))?;

        if code.trim().is_empty() {
            return Err(AppError::InvalidInput("Code must not be empty".to_string()));
        }

        tracing::info!("Executing Python code ({} bytes)", code.len());

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(json!({
                    "success": false,
                    "stdout": "",
                    "stderr": format!("Failed to start {}: {}", self.interpreter, e),
                }))
            }
            Err(_) => {
                return Ok(json!({
                    "success": false,
                    "stdout": "",
                    "stderr": format!("Execution timed out after {}s", self.timeout.as_secs()),
                }))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(json!({
            "success": output.status.success(),
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": output.status.code(),
        }))
    }
}
