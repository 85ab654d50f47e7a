//! Scripted in-memory transport for unit tests.

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcError, OutgoingMessage};
use crate::protocol::PROTOCOL_VERSION;
use crate::transport::{Correlator, Transport, TransportEvent, TransportFuture};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

type Handler = Box<dyn Fn(&str, Option<Value>) -> Result<Value, JsonRpcError> + Send + Sync>;

pub(crate) struct MockTransport {
    handler: Handler,
    correlator: Correlator,
    events: broadcast::Sender<TransportEvent>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
    fail_connect: bool,
    disconnected: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new(
        handler: impl Fn(&str, Option<Value>) -> Result<Value, JsonRpcError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            correlator: Correlator::new("mock", Duration::from_secs(1)),
            events: broadcast::channel(16).0,
            calls: Mutex::new(Vec::new()),
            fail_connect: false,
            disconnected: AtomicBool::new(false),
        }
    }

    /// A well-behaved server exposing `tools`. Calls echo `"<tool>: <args>"`.
    pub(crate) fn server(tools: &[&str]) -> Self {
        let listed: Vec<Value> = tools
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "description": format!("{name} tool"),
                    "inputSchema": {"type": "object"}
                })
            })
            .collect();
        Self::new(move |method, params| match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mock", "version": "0.0.1"}
            })),
            "tools/list" => Ok(json!({ "tools": listed })),
            "tools/call" => {
                let params = params.unwrap_or_default();
                let text = format!("{}: {}", params["name"].as_str().unwrap_or(""), params["arguments"]);
                Ok(json!({"content": [{"type": "text", "text": text}]}))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        })
    }

    pub(crate) fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Params sent with the most recent `method` call.
    pub(crate) fn last_params(&self, method: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .and_then(|(_, params)| params.clone())
    }

    pub(crate) fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Simulate the server going away.
    pub(crate) fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }
}

impl Transport for MockTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_connect {
                return Err(McpError::Connect {
                    name: "mock".into(),
                    message: "refused".into(),
                });
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> TransportFuture<'_, ()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn send(&self, _message: OutgoingMessage) -> TransportFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn request<'a>(&'a self, method: &'a str, params: Option<Value>) -> TransportFuture<'a, Value> {
        self.calls.lock().unwrap().push((method.to_string(), params.clone()));
        let outcome = (self.handler)(method, params);
        Box::pin(async move {
            outcome.map_err(|e| McpError::JsonRpc {
                server: "mock".into(),
                code: e.code,
                message: e.message,
            })
        })
    }

    fn notify<'a>(&'a self, method: &'a str, params: Option<Value>) -> TransportFuture<'a, ()> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        Box::pin(async { Ok(()) })
    }
}
