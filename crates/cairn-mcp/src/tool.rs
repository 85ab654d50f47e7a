//! McpTool — exposes one server tool through the shared tool registry.

use crate::connection::ServerConnection;
use crate::protocol::{ToolInfo, render_content};
use cairn_types::{Tool, ToolContext, ToolDefinition, ToolFuture, ToolOutput};
use std::sync::Arc;

/// Separator between server and tool name in a proxied tool's name.
pub const TOOL_NAME_SEPARATOR: &str = "__";

/// Registry name for `tool` on `server`, e.g. `github__search`.
pub fn proxied_tool_name(server: &str, tool: &str) -> String {
    format!("{server}{TOOL_NAME_SEPARATOR}{tool}")
}

/// A tool backed by an MCP server.
///
/// The server prefix keeps two servers' same-named tools apart in the
/// registry. Description and input schema pass through from the server.
pub struct McpTool {
    proxied_name: String,
    info: ToolInfo,
    connection: Arc<ServerConnection>,
}

impl McpTool {
    pub fn new(connection: Arc<ServerConnection>, info: ToolInfo) -> Self {
        Self {
            proxied_name: proxied_tool_name(connection.name(), &info.name),
            info,
            connection,
        }
    }

    pub fn server_name(&self) -> &str {
        self.connection.name()
    }

    /// The tool's name on its server.
    pub fn remote_name(&self) -> &str {
        &self.info.name
    }
}

impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.proxied_name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.proxied_name.clone(),
            description: self.info.description.clone().unwrap_or_default(),
            input_schema: self.info.input_schema.clone(),
        }
    }

    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let output = match self.connection.call_tool(&self.info.name, input).await {
                Ok(result) => ToolOutput {
                    content: render_content(&result.content),
                    is_error: result.is_error,
                },
                Err(e) => {
                    tracing::debug!("MCP tool '{}' failed: {e}", self.proxied_name);
                    ToolOutput::error(e.to_string())
                }
            };
            Ok(output)
        })
    }
}
