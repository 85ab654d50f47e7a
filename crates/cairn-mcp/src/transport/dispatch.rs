//! The per-connection dispatcher task.

use super::{Correlator, ServerNotification, TransportEvent};
use crate::jsonrpc::{IncomingMessage, JsonRpcError, JsonRpcReply, OutgoingMessage};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Capacity of the queue between a transport's reader and its dispatcher.
pub(crate) const INBOUND_CAPACITY: usize = 256;

/// Parse a raw text frame and queue it for dispatch. Malformed frames are
/// logged and dropped. Returns false once the dispatcher has gone away.
pub(crate) async fn enqueue_frame(
    server: &str,
    frame: &str,
    inbound: &mpsc::Sender<IncomingMessage>,
) -> bool {
    match IncomingMessage::parse(frame) {
        Ok(message) => inbound.send(message).await.is_ok(),
        Err(e) => {
            tracing::warn!(
                "Discarding malformed frame from MCP server '{server}': {e}: {}",
                cairn_types::truncate_for_display(frame, 200)
            );
            true
        }
    }
}

/// Consumes inbound messages for one connection, in arrival order.
pub(crate) struct Dispatcher {
    pub(crate) server: String,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) events: broadcast::Sender<TransportEvent>,
    /// Serialized replies to server-initiated requests. Held weakly so the
    /// dispatcher never keeps the write side of a transport alive.
    pub(crate) replies: mpsc::WeakSender<String>,
}

impl Dispatcher {
    /// Run until every sender of `inbound` is gone, then fail whatever is
    /// still pending and announce the close.
    pub(crate) async fn run(self, mut inbound: mpsc::Receiver<IncomingMessage>) {
        while let Some(message) = inbound.recv().await {
            self.dispatch(message);
        }
        self.correlator.fail_all();
        tracing::debug!("MCP server '{}' inbound stream ended", self.server);
        let _ = self.events.send(TransportEvent::Closed);
    }

    fn dispatch(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::Response { id: Some(id), outcome } => {
                if !self.correlator.resolve(id, outcome) {
                    tracing::debug!(
                        "MCP server '{}' answered unknown or expired request {id}",
                        self.server
                    );
                }
            }
            IncomingMessage::Response { id: None, outcome } => {
                if let Err(e) = outcome {
                    tracing::warn!(
                        "MCP server '{}' reported an unattributed error ({}): {}",
                        self.server,
                        e.code,
                        e.message
                    );
                }
            }
            IncomingMessage::Notification { method, params } => {
                let notification = ServerNotification::from_frame(&method, params);
                // No subscribers is fine.
                let _ = self.events.send(TransportEvent::Notification(notification));
            }
            IncomingMessage::Request { id, method, .. } => self.answer(id, &method),
        }
    }

    fn answer(&self, id: Value, method: &str) {
        let reply = if method == "ping" {
            JsonRpcReply::result(id, Value::Object(Default::default()))
        } else {
            tracing::debug!(
                "MCP server '{}' sent unsupported request '{method}'",
                self.server
            );
            JsonRpcReply::error(id, JsonRpcError::method_not_found(method))
        };

        let frame = match OutgoingMessage::Reply(reply).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode reply to '{method}': {e}");
                return;
            }
        };
        let Some(replies) = self.replies.upgrade() else {
            return;
        };
        if let Err(e) = replies.try_send(frame) {
            tracing::warn!(
                "Dropping reply to '{method}' for MCP server '{}': {e}",
                self.server
            );
        }
    }
}
