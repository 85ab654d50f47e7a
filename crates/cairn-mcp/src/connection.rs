//! One MCP server connection.
//!
//! A connection moves `Disconnected -> Connecting -> Connected`, or to
//! `Error` when any stage of initialization fails or the transport closes
//! underneath it. Initialization is: open the transport, exchange
//! `initialize` / `notifications/initialized`, then list whatever the server
//! advertised (tools, resources, prompts).

use crate::error::McpError;
use crate::protocol::{
    CLIENT_NAME, CallToolResult, GetPromptResult, InitializeResult, PROTOCOL_VERSION, PromptInfo,
    ReadResourceResult, ResourceInfo, ServerInfo, ToolInfo,
};
use crate::transport::{ServerNotification, Transport, TransportEvent};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Lifecycle state of a [`ServerConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Everything learned about the server during initialization.
#[derive(Debug, Clone, Default)]
struct Discovery {
    protocol_version: String,
    server_info: Option<ServerInfo>,
    instructions: Option<String>,
    tools: Vec<ToolInfo>,
    resources: Vec<ResourceInfo>,
    prompts: Vec<PromptInfo>,
}

/// A named MCP server reached through some [`Transport`].
pub struct ServerConnection {
    name: String,
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    discovery: RwLock<Discovery>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ServerConnection {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            discovery: RwLock::new(Discovery::default()),
            watcher: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to server notifications and the transport's close signal.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.transport.subscribe()
    }

    /// Run the full initialization sequence. On failure the state becomes
    /// `Error`, the transport is torn down, and the failing stage is named in
    /// the returned [`McpError::Initialization`].
    pub async fn connect(&self) -> Result<(), McpError> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == ConnectionState::Connected {
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        // Subscribe before opening so nothing sent during the handshake is missed.
        let events = self.transport.subscribe();

        match self.initialize().await {
            Ok(discovery) => {
                tracing::info!(
                    "MCP server '{}' connected: {} tools, {} resources, {} prompts",
                    self.name,
                    discovery.tools.len(),
                    discovery.resources.len(),
                    discovery.prompts.len()
                );
                *self.discovery.write().unwrap_or_else(PoisonError::into_inner) = discovery;
                self.set_state(ConnectionState::Connected);
                self.watch(events);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Error(e.to_string()));
                if let Err(close_err) = self.transport.disconnect().await {
                    tracing::debug!("Cleanup after failed connect to '{}': {close_err}", self.name);
                }
                Err(e)
            }
        }
    }

    async fn initialize(&self) -> Result<Discovery, McpError> {
        self.transport
            .connect()
            .await
            .map_err(|e| e.during(&self.name, "transport"))?;

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let init: InitializeResult = self
            .typed_request("initialize", Some(params))
            .await
            .map_err(|e| e.during(&self.name, "handshake"))?;
        if init.protocol_version != PROTOCOL_VERSION {
            tracing::debug!(
                "MCP server '{}' negotiated protocol version '{}'",
                self.name,
                init.protocol_version
            );
        }
        self.transport
            .notify("notifications/initialized", None)
            .await
            .map_err(|e| e.during(&self.name, "handshake"))?;

        let caps = &init.capabilities;
        let discover = |e: McpError| e.during(&self.name, "discovery");
        let tools = match caps.tools {
            Some(_) => self.list_all("tools/list", "tools").await.map_err(discover)?,
            None => Vec::new(),
        };
        let resources = match caps.resources {
            Some(_) => self
                .list_all("resources/list", "resources")
                .await
                .map_err(discover)?,
            None => Vec::new(),
        };
        let prompts = match caps.prompts {
            Some(_) => self.list_all("prompts/list", "prompts").await.map_err(discover)?,
            None => Vec::new(),
        };

        Ok(Discovery {
            protocol_version: init.protocol_version,
            server_info: init.server_info,
            instructions: init.instructions,
            tools,
            resources,
            prompts,
        })
    }

    /// Collect every page of a list method, following `nextCursor`.
    async fn list_all<T: DeserializeOwned>(&self, method: &str, key: &str) -> Result<Vec<T>, McpError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let mut page = self.transport.request(method, params).await?;

            let entries = match page.get_mut(key).map(Value::take) {
                Some(Value::Array(entries)) => entries,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(McpError::Protocol(format!(
                        "{method}: expected '{key}' to be an array, got {other}"
                    )));
                }
            };
            for entry in entries {
                items.push(serde_json::from_value(entry).map_err(|e| {
                    McpError::Protocol(format!("{method}: malformed entry: {e}"))
                })?);
            }

            let next = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            match next {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(_) => {
                    tracing::warn!("MCP server '{}' repeated cursor on {method}", self.name);
                    break;
                }
                None => break,
            }
        }
        Ok(items)
    }

    async fn typed_request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T, McpError> {
        let value = self.transport.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("{method}: malformed result: {e}")))
    }

    fn ensure_connected(&self) -> Result<(), McpError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(McpError::NotConnected {
                name: self.name.clone(),
            })
        }
    }

    /// Invoke a tool by its server-side name.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.ensure_connected()?;
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        self.typed_request("tools/call", Some(json!({ "name": tool, "arguments": arguments })))
            .await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        self.ensure_connected()?;
        self.typed_request("resources/read", Some(json!({ "uri": uri })))
            .await
    }

    pub async fn get_prompt(&self, name: &str, arguments: Value) -> Result<GetPromptResult, McpError> {
        self.ensure_connected()?;
        let mut params = json!({ "name": name });
        if !arguments.is_null() {
            params["arguments"] = arguments;
        }
        self.typed_request("prompts/get", Some(params)).await
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.discovery().tools.clone()
    }

    pub fn resources(&self) -> Vec<ResourceInfo> {
        self.discovery().resources.clone()
    }

    pub fn prompts(&self) -> Vec<PromptInfo> {
        self.discovery().prompts.clone()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.discovery().server_info.clone()
    }

    pub fn protocol_version(&self) -> String {
        self.discovery().protocol_version.clone()
    }

    pub fn instructions(&self) -> Option<String> {
        self.discovery().instructions.clone()
    }

    /// Tear down the transport. Pending requests fail; the state becomes
    /// `Disconnected` and discovered capabilities are cleared.
    pub async fn disconnect(&self) -> Result<(), McpError> {
        if let Some(watcher) = self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take() {
            watcher.abort();
        }
        let result = self.transport.disconnect().await;
        *self.discovery.write().unwrap_or_else(PoisonError::into_inner) = Discovery::default();
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("MCP server '{}' disconnected", self.name);
        result
    }

    fn discovery(&self) -> std::sync::RwLockReadGuard<'_, Discovery> {
        self.discovery.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Follow transport events: log notifications, and move to `Error` if
    /// the transport closes while we consider ourselves connected.
    fn watch(&self, mut events: broadcast::Receiver<TransportEvent>) {
        let name = self.name.clone();
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TransportEvent::Notification(notification)) => {
                        log_notification(&name, &notification);
                    }
                    Ok(TransportEvent::Closed) => {
                        let mut state = state.write().unwrap_or_else(PoisonError::into_inner);
                        if *state == ConnectionState::Connected {
                            tracing::warn!("MCP server '{name}' closed the connection");
                            *state = ConnectionState::Error("transport closed".into());
                        }
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("MCP server '{name}': skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take() {
            watcher.abort();
        }
    }
}

fn log_notification(server: &str, notification: &ServerNotification) {
    match notification {
        ServerNotification::Log { level, data, .. } => {
            tracing::debug!("[mcp:{server}] {level}: {data}");
        }
        ServerNotification::ToolsListChanged => {
            tracing::info!("MCP server '{server}' reports its tool list changed");
        }
        other => tracing::debug!("MCP server '{server}' notification: {other:?}"),
    }
}
