//! JSON-RPC 2.0 envelopes exchanged with MCP servers.
//!
//! Outgoing frames are built from typed structs. Incoming frames are validated
//! and classified into an [`IncomingMessage`] before anything else sees them.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Error code for "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Our reply to a request the server sent us.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }
}

/// Any frame we write to a server.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Reply(JsonRpcReply),
}

impl OutgoingMessage {
    /// Serialize to a single-line JSON frame.
    pub fn to_frame(&self) -> Result<String, McpError> {
        let frame = match self {
            OutgoingMessage::Request(r) => serde_json::to_string(r)?,
            OutgoingMessage::Notification(n) => serde_json::to_string(n)?,
            OutgoingMessage::Reply(r) => serde_json::to_string(r)?,
        };
        Ok(frame)
    }
}

/// A validated frame received from a server.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Answer to one of our requests. `id` is `None` when the server could not
    /// attribute the error to a request (for example a parse error).
    Response {
        id: Option<u64>,
        outcome: Result<Value, JsonRpcError>,
    },
    /// One-way message from the server.
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Request from the server that expects a reply from us.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl IncomingMessage {
    /// Parse and classify one JSON text frame.
    pub fn parse(frame: &str) -> Result<Self, McpError> {
        let value: Value = serde_json::from_str(frame)?;
        Self::from_value(value)
    }

    /// Classify an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, McpError> {
        let raw: RawFrame = serde_json::from_value(value)?;

        match raw.jsonrpc.as_deref() {
            Some(JSONRPC_VERSION) => {}
            Some(other) => {
                return Err(McpError::Protocol(format!(
                    "unsupported jsonrpc version '{other}'"
                )));
            }
            None => return Err(McpError::Protocol("missing jsonrpc version".into())),
        }

        match (raw.method, raw.id) {
            (Some(method), Some(id)) => Ok(IncomingMessage::Request {
                id,
                method,
                params: raw.params,
            }),
            (Some(method), None) => Ok(IncomingMessage::Notification {
                method,
                params: raw.params,
            }),
            (None, id) => {
                let id_num = id.as_ref().and_then(response_id);
                if let Some(error) = raw.error {
                    Ok(IncomingMessage::Response {
                        id: id_num,
                        outcome: Err(error),
                    })
                } else if id.is_some() {
                    Ok(IncomingMessage::Response {
                        id: id_num,
                        outcome: Ok(raw.result.unwrap_or(Value::Null)),
                    })
                } else {
                    Err(McpError::Protocol(
                        "frame has neither a method nor an id".into(),
                    ))
                }
            }
        }
    }
}

/// Our request ids are integers, but some servers echo them back as strings.
fn response_id(id: &Value) -> Option<u64> {
    let parsed = match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    if parsed.is_none() && !id.is_null() {
        tracing::warn!("Ignoring response with non-numeric id {id}");
    }
    parsed
}
