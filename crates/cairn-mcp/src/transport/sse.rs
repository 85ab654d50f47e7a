//! SSE transport for remote MCP servers.
//!
//! The server pushes frames to us over a long-lived `text/event-stream` GET.
//! We send frames as HTTP POSTs. The POST target defaults to the stream URL
//! and is replaced by the URL in an `endpoint` event if the server sends one.
//! A session token, when the server offers one, is echoed on every POST.

use super::dispatch::{Dispatcher, INBOUND_CAPACITY, enqueue_frame};
use super::{Correlator, EVENT_CAPACITY, Transport, TransportEvent, TransportFuture};
use crate::error::McpError;
use crate::jsonrpc::{IncomingMessage, OutgoingMessage};
use futures_util::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

/// Header carrying the server-assigned session token.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on how long connect waits for the stream's first event.
const FIRST_EVENT_WAIT: Duration = Duration::from_secs(5);

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser. Works on bytes so a chunk boundary inside a
/// multi-byte character does no harm.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return any complete events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = Self::parse_block(&String::from_utf8_lossy(&block[..pos])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final block that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        Self::parse_block(&String::from_utf8_lossy(&rest))
    }

    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();

        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }
            if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    _ => {}
                }
            } else if line == "data" {
                data_lines.push(String::new());
            }
        }

        if data_lines.is_empty() {
            return None;
        }
        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

/// Where POSTs go and which session they belong to.
#[derive(Debug, Clone)]
struct Endpoint {
    post_url: Url,
    session_id: Option<String>,
}

type SharedEndpoint = Arc<RwLock<Endpoint>>;

/// Resolve an `endpoint` event against the stream URL, picking up a
/// `sessionId` query parameter if present.
fn resolve_endpoint(base: &Url, data: &str) -> Option<(Url, Option<String>)> {
    let url = base.join(data.trim()).ok()?;
    let session = url
        .query_pairs()
        .find(|(key, _)| key == "sessionId" || key == "session_id")
        .map(|(_, value)| value.into_owned());
    Some((url, session))
}

fn header_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Issues POSTs for one connection.
#[derive(Clone)]
struct Poster {
    name: String,
    http: reqwest::Client,
    headers: HeaderMap,
    endpoint: SharedEndpoint,
    timeout: Duration,
}

impl Poster {
    /// POST one frame. If the server answers inline (JSON or an event stream
    /// body) the contained frames are queued on `inbound`.
    async fn post(
        &self,
        frame: String,
        inbound: Option<&mpsc::Sender<IncomingMessage>>,
    ) -> Result<(), McpError> {
        let Endpoint {
            post_url,
            session_id,
        } = self
            .endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut request = self
            .http
            .post(post_url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .timeout(self.timeout)
            .body(frame);
        if let Some(session) = session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| McpError::Send {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        if let Some(session) = header_session(response.headers()) {
            let mut endpoint = self.endpoint.write().unwrap_or_else(PoisonError::into_inner);
            if endpoint.session_id.is_none() {
                endpoint.session_id = Some(session);
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                name: self.name.clone(),
                status: status.as_u16(),
                body: cairn_types::truncate_for_display(&body, 500),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response.text().await.map_err(|e| McpError::Send {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        let Some(inbound) = inbound else {
            return Ok(());
        };
        if body.trim().is_empty() {
            return Ok(());
        }
        if content_type.starts_with("text/event-stream") {
            let mut parser = SseParser::new();
            let mut events = parser.feed(body.as_bytes());
            events.extend(parser.finish());
            for event in events.into_iter().filter(is_message) {
                enqueue_frame(&self.name, &event.data, inbound).await;
            }
        } else if content_type.contains("json") {
            self.enqueue_json_body(&body, inbound).await;
        }
        Ok(())
    }

    async fn enqueue_json_body(&self, body: &str, inbound: &mpsc::Sender<IncomingMessage>) {
        let frames = match serde_json::from_str::<Value>(body) {
            Ok(Value::Array(items)) => items,
            Ok(value) => vec![value],
            Err(e) => {
                tracing::warn!("Discarding malformed POST response from '{}': {e}", self.name);
                return;
            }
        };
        for frame in frames {
            match IncomingMessage::from_value(frame) {
                Ok(message) => {
                    let _ = inbound.send(message).await;
                }
                Err(e) => tracing::warn!("Discarding invalid frame from '{}': {e}", self.name),
            }
        }
    }
}

fn is_message(event: &SseEvent) -> bool {
    matches!(event.event_type.as_deref(), None | Some("message"))
}

/// Route one stream event. Returns false once the dispatcher is gone.
async fn handle_event(
    name: &str,
    base: &Url,
    endpoint: &SharedEndpoint,
    event: SseEvent,
    inbound: &mpsc::Sender<IncomingMessage>,
) -> bool {
    match event.event_type.as_deref() {
        Some("endpoint") => {
            match resolve_endpoint(base, &event.data) {
                Some((url, session)) => {
                    tracing::debug!("MCP server '{name}' assigned POST endpoint {url}");
                    let mut endpoint = endpoint.write().unwrap_or_else(PoisonError::into_inner);
                    endpoint.post_url = url;
                    if session.is_some() {
                        endpoint.session_id = session;
                    }
                }
                None => tracing::warn!(
                    "MCP server '{name}' sent an unusable endpoint: {}",
                    event.data
                ),
            }
            true
        }
        None | Some("message") => enqueue_frame(name, &event.data, inbound).await,
        Some(other) => {
            tracing::debug!("Ignoring '{other}' event from MCP server '{name}'");
            true
        }
    }
}

/// Read until the parser yields at least one event. `Ok(None)` means the
/// stream ended.
async fn next_events<S>(body: &mut S, parser: &mut SseParser) -> Result<Option<Vec<SseEvent>>, reqwest::Error>
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
{
    while let Some(chunk) = body.next().await {
        let events = parser.feed(&chunk?);
        if !events.is_empty() {
            return Ok(Some(events));
        }
    }
    Ok(parser.finish().map(|event| vec![event]))
}

/// The open event stream and its helpers.
struct EventStream {
    inbound: mpsc::WeakSender<IncomingMessage>,
    reply_tx: mpsc::Sender<String>,
    tasks: Vec<JoinHandle<()>>,
}

/// SSE + HTTP POST transport for a remote MCP server.
pub struct SseTransport {
    name: String,
    url: Url,
    poster: Poster,
    correlator: Arc<Correlator>,
    events: broadcast::Sender<TransportEvent>,
    stream: Mutex<Option<EventStream>>,
}

impl SseTransport {
    pub fn new(
        name: &str,
        url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let invalid = |message: String| McpError::InvalidConfig {
            name: name.to_string(),
            message,
        };
        let url = Url::parse(url).map_err(|e| invalid(format!("bad url '{url}': {e}")))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in &headers {
            let key = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| invalid(format!("bad header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("bad value for header '{key}': {e}")))?;
            header_map.insert(key, value);
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            name: name.to_string(),
            poster: Poster {
                name: name.to_string(),
                http,
                headers: header_map,
                endpoint: Arc::new(RwLock::new(Endpoint {
                    post_url: url.clone(),
                    session_id: None,
                })),
                timeout,
            },
            url,
            correlator: Arc::new(Correlator::new(name, timeout)),
            events,
            stream: Mutex::new(None),
        })
    }

    /// The session token in use, if the server assigned one.
    pub fn session_id(&self) -> Option<String> {
        self.poster
            .endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session_id
            .clone()
    }

    async fn open(&self) -> Result<EventStream, McpError> {
        let connect_err = |message: String| McpError::Connect {
            name: self.name.clone(),
            message,
        };

        let response = self
            .poster
            .http
            .get(self.url.clone())
            .headers(self.poster.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                name: self.name.clone(),
                status: status.as_u16(),
                body: cairn_types::truncate_for_display(&body, 500),
            });
        }

        *self
            .poster
            .endpoint
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Endpoint {
            post_url: self.url.clone(),
            session_id: header_session(response.headers()),
        };

        let mut body = Box::pin(response.bytes_stream());
        let mut parser = SseParser::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        // The first event may carry the POST endpoint and session, so it is
        // handled before anything is sent.
        let wait = FIRST_EVENT_WAIT.min(self.correlator.timeout());
        match tokio::time::timeout(wait, next_events(&mut body, &mut parser)).await {
            Ok(Ok(Some(events))) => {
                for event in events {
                    handle_event(&self.name, &self.url, &self.poster.endpoint, event, &inbound_tx)
                        .await;
                }
            }
            Ok(Ok(None)) => return Err(connect_err("event stream closed immediately".into())),
            Ok(Err(e)) => return Err(connect_err(e.to_string())),
            Err(_) => tracing::debug!(
                "MCP server '{}' sent no initial event, posting to the stream URL",
                self.name
            ),
        }

        let name = self.name.clone();
        let base = self.url.clone();
        let endpoint = Arc::clone(&self.poster.endpoint);
        let inbound = inbound_tx.downgrade();
        let reader = tokio::spawn(async move {
            loop {
                match next_events(&mut body, &mut parser).await {
                    Ok(Some(events)) => {
                        for event in events {
                            if !handle_event(&name, &base, &endpoint, event, &inbound_tx).await {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("MCP server '{name}' event stream failed: {e}");
                        break;
                    }
                }
            }
        });

        let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);
        let poster = self.poster.clone();
        let replier = tokio::spawn(async move {
            while let Some(frame) = reply_rx.recv().await {
                if let Err(e) = poster.post(frame, None).await {
                    tracing::warn!("Failed to deliver reply to MCP server '{}': {e}", poster.name);
                }
            }
        });

        let dispatcher = Dispatcher {
            server: self.name.clone(),
            correlator: Arc::clone(&self.correlator),
            events: self.events.clone(),
            replies: reply_tx.downgrade(),
        };
        tokio::spawn(dispatcher.run(inbound_rx));

        Ok(EventStream {
            inbound,
            reply_tx,
            tasks: vec![reader, replier],
        })
    }
}

impl Transport for SseTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let mut stream = self.stream.lock().await;
            if stream.is_none() {
                *stream = Some(self.open().await?);
                tracing::debug!("Opened event stream to MCP server '{}'", self.name);
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let Some(stream) = self.stream.lock().await.take() else {
                return Ok(());
            };
            drop(stream.reply_tx);
            for task in stream.tasks {
                task.abort();
            }
            self.correlator.fail_all();
            Ok(())
        })
    }

    fn send(&self, message: OutgoingMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let frame = message.to_frame()?;
            let inbound = match self.stream.lock().await.as_ref() {
                Some(stream) => stream.inbound.upgrade(),
                None => {
                    return Err(McpError::NotConnected {
                        name: self.name.clone(),
                    });
                }
            };
            let Some(inbound) = inbound else {
                return Err(McpError::Closed {
                    name: self.name.clone(),
                });
            };
            self.poster.post(frame, Some(&inbound)).await
        })
    }

    fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
