//! MCP (Model Context Protocol) client implementation for Cairn.
//!
//! Tool servers are reached over one of two transports: a spawned child
//! process speaking newline-delimited JSON-RPC 2.0 on stdin/stdout, or a
//! remote server that pushes messages over Server-Sent Events and accepts
//! requests as HTTP POSTs. Each server is initialized with a handshake, its
//! capabilities are discovered, and its tools are registered as proxies in the
//! shared [`cairn_tools::ToolRegistry`].

pub mod config;
pub mod connection;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod protocol;
pub mod tool;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{McpConfig, McpServerConfig, TransportConfig};
pub use connection::{ConnectionState, ServerConnection};
pub use error::McpError;
pub use manager::McpManager;
pub use protocol::{CallToolResult, PromptInfo, ResourceInfo, ToolContent, ToolInfo};
pub use tool::{McpTool, TOOL_NAME_SEPARATOR, proxied_tool_name};
pub use transport::{
    Correlator, ServerNotification, SseTransport, StdioTransport, Transport, TransportEvent,
};
