//! Transports that carry JSON-RPC frames to and from an MCP server.
//!
//! Every transport feeds received frames into one dispatcher task per
//! connection, which resolves pending requests through the shared
//! [`Correlator`], answers server-initiated requests and broadcasts
//! notifications as [`TransportEvent`]s.

mod correlator;
mod dispatch;
mod framing;
mod sse;
mod stdio;

pub use correlator::{Correlator, PendingRequest};
pub use sse::{SseEvent, SseParser, SseTransport};
pub use stdio::StdioTransport;

use crate::config::{McpServerConfig, TransportConfig};
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, OutgoingMessage};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, McpError>> + Send + 'a>>;

/// Capacity of each connection's event broadcast channel.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// A notification pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    ToolsListChanged,
    ResourcesListChanged,
    PromptsListChanged,
    Progress {
        token: Value,
        progress: f64,
        total: Option<f64>,
    },
    Log {
        level: String,
        logger: Option<String>,
        data: Value,
    },
    Other {
        method: String,
        params: Option<Value>,
    },
}

impl ServerNotification {
    pub fn from_frame(method: &str, params: Option<Value>) -> Self {
        let field = |name: &str| params.as_ref().and_then(|p| p.get(name)).cloned();
        match method {
            "notifications/tools/list_changed" => ServerNotification::ToolsListChanged,
            "notifications/resources/list_changed" => ServerNotification::ResourcesListChanged,
            "notifications/prompts/list_changed" => ServerNotification::PromptsListChanged,
            "notifications/progress" => ServerNotification::Progress {
                token: field("progressToken").unwrap_or(Value::Null),
                progress: field("progress").and_then(|v| v.as_f64()).unwrap_or(0.0),
                total: field("total").and_then(|v| v.as_f64()),
            },
            "notifications/message" => ServerNotification::Log {
                level: field("level")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "info".to_string()),
                logger: field("logger").and_then(|v| v.as_str().map(str::to_string)),
                data: field("data").unwrap_or(Value::Null),
            },
            _ => ServerNotification::Other {
                method: method.to_string(),
                params,
            },
        }
    }
}

/// Something that happened on a transport outside of request/response.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Notification(ServerNotification),
    /// The inbound side ended. All pending requests have been failed.
    Closed,
}

/// A bidirectional JSON-RPC channel to one MCP server.
pub trait Transport: Send + Sync {
    /// Establish the underlying channel (spawn the process, open the stream).
    fn connect(&self) -> TransportFuture<'_, ()>;

    /// Tear the channel down. Pending requests fail with [`McpError::Closed`].
    fn disconnect(&self) -> TransportFuture<'_, ()>;

    /// Write one frame.
    fn send(&self, message: OutgoingMessage) -> TransportFuture<'_, ()>;

    /// Request/response correlation state for this channel.
    fn correlator(&self) -> &Correlator;

    /// Subscribe to notifications and the closed signal.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Send a request and wait for its response.
    fn request<'a>(&'a self, method: &'a str, params: Option<Value>) -> TransportFuture<'a, Value> {
        Box::pin(async move {
            let correlator = self.correlator();
            let pending = correlator.register();
            tracing::debug!(id = pending.id(), method, "MCP request");
            let message = OutgoingMessage::Request(JsonRpcRequest::new(pending.id(), method, params));
            // Dropping `pending` on the error path removes the entry.
            self.send(message).await?;
            correlator.wait(pending, method).await
        })
    }

    /// Send a notification; nothing is awaited beyond the write.
    fn notify<'a>(&'a self, method: &'a str, params: Option<Value>) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.send(OutgoingMessage::Notification(JsonRpcNotification::new(method, params)))
                .await
        })
    }
}

/// Build the transport described by a server's configuration.
pub fn from_config(name: &str, config: &McpServerConfig) -> Result<Arc<dyn Transport>, McpError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    match &config.transport {
        TransportConfig::Stdio { command, args, env } => Ok(Arc::new(StdioTransport::new(
            name,
            command,
            args.clone(),
            env.clone(),
            timeout,
        ))),
        TransportConfig::Sse { url, headers } => Ok(Arc::new(SseTransport::new(
            name,
            url,
            headers.clone(),
            timeout,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_changed_notifications_are_typed() {
        assert_eq!(
            ServerNotification::from_frame("notifications/tools/list_changed", None),
            ServerNotification::ToolsListChanged
        );
        assert_eq!(
            ServerNotification::from_frame("notifications/prompts/list_changed", None),
            ServerNotification::PromptsListChanged
        );
    }

    #[test]
    fn progress_notification_fields() {
        let n = ServerNotification::from_frame(
            "notifications/progress",
            Some(json!({"progressToken": "t1", "progress": 3, "total": 10})),
        );
        assert_eq!(
            n,
            ServerNotification::Progress {
                token: json!("t1"),
                progress: 3.0,
                total: Some(10.0),
            }
        );
    }

    #[test]
    fn log_notification_defaults() {
        let n = ServerNotification::from_frame(
            "notifications/message",
            Some(json!({"data": "hello"})),
        );
        let ServerNotification::Log { level, logger, data } = n else {
            panic!("expected log notification");
        };
        assert_eq!(level, "info");
        assert!(logger.is_none());
        assert_eq!(data, json!("hello"));
    }

    #[test]
    fn unknown_notification_is_preserved() {
        let n = ServerNotification::from_frame("custom/thing", Some(json!({"a": 1})));
        assert_eq!(
            n,
            ServerNotification::Other {
                method: "custom/thing".into(),
                params: Some(json!({"a": 1})),
            }
        );
    }

    #[test]
    fn from_config_rejects_bad_url() {
        let result = from_config("bad", &McpServerConfig::sse("not a url"));
        assert!(matches!(result, Err(McpError::InvalidConfig { .. })));
    }

    #[test]
    fn from_config_builds_stdio() {
        let result = from_config("local", &McpServerConfig::stdio("cat", vec![]));
        assert!(result.is_ok());
    }
}
