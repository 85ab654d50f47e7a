use serde::{Deserialize, Serialize};

/// Events that can trigger hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    BeforeTool,
    AfterTool,
}

impl HookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            HookEvent::BeforeTool => "before_tool",
            HookEvent::AfterTool => "after_tool",
        }
    }
}

fn default_hook_timeout() -> u64 {
    10_000
}

/// Configuration for a single hook command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Which event runs this hook.
    pub event: HookEvent,
    /// Shell command, run with `sh -c`.
    pub command: String,
    /// Timeout in milliseconds (default: 10000).
    #[serde(default = "default_hook_timeout")]
    pub timeout_ms: u64,
}

/// Output longer than this is cut before being handed to hooks.
const MAX_PAYLOAD_OUTPUT: usize = 10_000;

/// JSON payload written to a hook's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookPayload {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl HookPayload {
    pub fn before_tool(tool_name: &str, tool_input: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            tool_input,
            tool_output: None,
            is_error: None,
        }
    }

    pub fn after_tool(
        tool_name: &str,
        tool_input: serde_json::Value,
        output: &str,
        is_error: bool,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            tool_input,
            tool_output: Some(cairn_types::truncate_str(output, MAX_PAYLOAD_OUTPUT).to_string()),
            is_error: Some(is_error),
        }
    }
}
