//! MCP manager — owns every server connection and its registry entries.

use crate::config::McpConfig;
use crate::connection::{ConnectionState, ServerConnection};
use crate::error::McpError;
use crate::tool::{McpTool, TOOL_NAME_SEPARATOR};
use crate::transport;
use cairn_tools::ToolRegistry;
use cairn_types::Tool;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A connected server and the proxies it registered.
struct ManagedServer {
    connection: Arc<ServerConnection>,
    tools: Vec<Arc<McpTool>>,
}

/// Manages connections to multiple MCP servers.
///
/// Each connected server's tools are registered in the shared registry as
/// `<server>__<tool>` and unregistered again when the server is removed.
pub struct McpManager {
    registry: Arc<ToolRegistry>,
    servers: BTreeMap<String, ManagedServer>,
}

impl McpManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            servers: BTreeMap::new(),
        }
    }

    /// Connect every enabled server in `config`.
    ///
    /// Servers that fail to start are logged and skipped; startup continues
    /// with whatever servers are available.
    pub async fn start(config: &McpConfig, registry: Arc<ToolRegistry>) -> Self {
        let mut manager = Self::new(registry);

        for (name, server_config) in &config.servers {
            if !server_config.enabled {
                tracing::debug!("MCP server '{name}' is disabled, skipping");
                continue;
            }
            let result = match transport::from_config(name, server_config) {
                Ok(transport) => manager.add_server(ServerConnection::new(name.clone(), transport)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!("Failed to start MCP server '{name}': {e}");
            }
        }

        manager
    }

    /// Connect `connection` and register its tools. A server already present
    /// under the same name is removed first. Returns the number of tools
    /// registered.
    ///
    /// Server names may not contain `__`, since that separator is what keeps
    /// `<server>__<tool>` names from two servers apart.
    pub async fn add_server(&mut self, connection: ServerConnection) -> Result<usize, McpError> {
        let name = connection.name().to_string();
        if name.is_empty() || name.contains(TOOL_NAME_SEPARATOR) {
            return Err(McpError::InvalidConfig {
                name,
                message: format!("server names must be non-empty and must not contain '{TOOL_NAME_SEPARATOR}'"),
            });
        }
        if self.servers.contains_key(&name) {
            self.remove_server(&name).await;
        }

        connection.connect().await?;
        let connection = Arc::new(connection);

        let mut tools = Vec::new();
        for info in connection.tools() {
            let proxy = Arc::new(McpTool::new(Arc::clone(&connection), info));
            if self.registry.register(Arc::clone(&proxy) as Arc<dyn Tool>).is_some() {
                tracing::warn!("MCP tool '{}' replaced an existing tool", proxy.name());
            }
            tools.push(proxy);
        }

        let count = tools.len();
        tracing::info!("MCP server '{name}' started ({count} tools)");
        self.servers.insert(name, ManagedServer { connection, tools });
        Ok(count)
    }

    /// Unregister a server's tools and disconnect it. Returns false if no
    /// server by that name was managed.
    pub async fn remove_server(&mut self, name: &str) -> bool {
        let Some(server) = self.servers.remove(name) else {
            return false;
        };
        self.retire(name, server).await;
        true
    }

    /// Drop servers whose connection is no longer usable (for example after
    /// the process exited), returning their names.
    pub async fn prune_disconnected(&mut self) -> Vec<String> {
        let dead: Vec<String> = self
            .servers
            .iter()
            .filter(|(_, server)| server.connection.state() != ConnectionState::Connected)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &dead {
            self.remove_server(name).await;
        }
        dead
    }

    pub fn connection(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.servers.get(name).map(|s| Arc::clone(&s.connection))
    }

    /// All managed connections, ordered by server name.
    pub fn connections(&self) -> Vec<Arc<ServerConnection>> {
        self.servers
            .values()
            .map(|s| Arc::clone(&s.connection))
            .collect()
    }

    /// Every proxy tool currently registered by this manager.
    pub fn tools(&self) -> Vec<Arc<McpTool>> {
        self.servers
            .values()
            .flat_map(|s| s.tools.iter().cloned())
            .collect()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Server names with their tool counts.
    pub fn server_summary(&self) -> Vec<(&str, usize)> {
        self.servers
            .iter()
            .map(|(name, s)| (name.as_str(), s.tools.len()))
            .collect()
    }

    /// Disconnect every server and remove all of their tools.
    pub async fn shutdown(&mut self) {
        let servers = std::mem::take(&mut self.servers);
        for (name, server) in servers {
            self.retire(&name, server).await;
        }
    }

    async fn retire(&self, name: &str, server: ManagedServer) {
        for tool in &server.tools {
            let entry: Arc<dyn Tool> = Arc::clone(tool) as Arc<dyn Tool>;
            if !self.registry.unregister_entry(&entry) {
                tracing::debug!("MCP tool '{}' was already replaced, leaving it registered", tool.name());
            }
        }
        if let Err(e) = server.connection.disconnect().await {
            tracing::debug!("Error disconnecting MCP server '{name}': {e}");
        }
        tracing::debug!("MCP server '{name}' removed");
    }
}
