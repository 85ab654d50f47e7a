//! Error types for MCP operations.

use thiserror::Error;

/// Errors from MCP server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("Failed to connect to MCP server '{name}': {message}")]
    Connect { name: String, message: String },

    #[error("MCP server '{name}' returned HTTP {status}: {body}")]
    Http {
        name: String,
        status: u16,
        body: String,
    },

    #[error("Failed to send to MCP server '{name}': {message}")]
    Send { name: String, message: String },

    #[error("MCP server '{name}' is not connected")]
    NotConnected { name: String },

    #[error("Connection to MCP server '{name}' closed")]
    Closed { name: String },

    #[error("JSON-RPC error from '{server}' (code {code}): {message}")]
    JsonRpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("MCP server '{server}' failed during {stage}: {source}")]
    Initialization {
        server: String,
        stage: &'static str,
        #[source]
        source: Box<McpError>,
    },

    #[error("Invalid configuration for MCP server '{name}': {message}")]
    InvalidConfig { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Wrap an error with the initialization stage it occurred in.
    pub(crate) fn during(self, server: &str, stage: &'static str) -> Self {
        McpError::Initialization {
            server: server.to_string(),
            stage,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialization_error_names_stage() {
        let err = McpError::Timeout {
            method: "initialize".into(),
            timeout_ms: 100,
        }
        .during("github", "handshake");
        let text = err.to_string();
        assert!(text.contains("github"));
        assert!(text.contains("handshake"));
        assert!(text.contains("timed out after 100ms"));
    }
}
