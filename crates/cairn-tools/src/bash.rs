//! Bash tool — executes shell commands.

use cairn_types::{Tool, ToolContext, ToolDefinition, ToolError, ToolFuture, ToolOutput};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

/// Maximum output length before truncation.
const MAX_OUTPUT_BYTES: usize = 30_000;

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;

/// Tool for executing bash commands with a timeout and output truncation.
#[derive(Default)]
pub struct BashTool;

#[derive(Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
}

impl BashTool {
    pub fn new() -> Self {
        Self
    }
}

impl Tool for BashTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Bash".to_string(),
            description: "Run a bash command in the working directory and return its combined \
                          stdout and stderr. Output over 30K bytes is truncated. Commands time \
                          out after 2 minutes unless a timeout is given."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The bash command to execute"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (max 600000)"
                    }
                }
            }),
        }
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let input: BashInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: "Bash".into(),
                    message: e.to_string(),
                })?;

            let timeout_ms = input.timeout.unwrap_or(DEFAULT_TIMEOUT_MS).min(MAX_TIMEOUT_MS);
            tracing::debug!("Bash: {}", input.command);

            let run = Command::new("bash")
                .arg("-c")
                .arg(&input.command)
                .current_dir(&ctx.cwd)
                .kill_on_drop(true)
                .output();

            let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), run).await
            {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(ToolError::ExecutionFailed(format!(
                        "Failed to spawn bash: {e}"
                    )));
                }
                Err(_) => return Err(ToolError::Timeout { timeout_ms }),
            };

            let exit_code = output.status.code().unwrap_or(-1);
            let text = combine_output(&output.stdout, &output.stderr, exit_code);

            Ok(ToolOutput {
                content: text,
                is_error: exit_code != 0,
            })
        })
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8], exit_code: i32) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut text = stdout.into_owned();
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    if text.len() > MAX_OUTPUT_BYTES {
        text = format!(
            "{}\n\n(output truncated)",
            cairn_types::truncate_str(&text, MAX_OUTPUT_BYTES)
        );
    }

    if text.is_empty() {
        text = if exit_code == 0 {
            "(no output)".to_string()
        } else {
            format!("Command exited with code {exit_code}")
        };
    }
    text
}
