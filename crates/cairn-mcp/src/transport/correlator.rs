//! Request/response correlation.
//!
//! Each outstanding request owns a [`PendingRequest`] that removes its entry
//! from the table when dropped, so a request that times out, fails to send,
//! or is abandoned by its caller never leaves a dangling entry behind.

use crate::error::McpError;
use crate::jsonrpc::JsonRpcError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type Outcome = Result<Value, JsonRpcError>;

/// Monotonic request id source, one per connection.
#[derive(Debug)]
struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Table of requests awaiting a response from one server.
#[derive(Debug)]
pub struct Correlator {
    server: String,
    ids: RequestIds,
    pending: Mutex<HashMap<u64, oneshot::Sender<Outcome>>>,
    timeout: Duration,
}

/// Handle for one outstanding request.
#[derive(Debug)]
pub struct PendingRequest<'a> {
    id: u64,
    rx: oneshot::Receiver<Outcome>,
    correlator: &'a Correlator,
}

impl PendingRequest<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.correlator.lock().remove(&self.id);
    }
}

impl Correlator {
    pub fn new(server: &str, timeout: Duration) -> Self {
        Self {
            server: server.to_string(),
            ids: RequestIds::new(),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocate an id and start tracking it.
    pub fn register(&self) -> PendingRequest<'_> {
        let id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        PendingRequest {
            id,
            rx,
            correlator: self,
        }
    }

    /// Deliver a response. Returns false when no request with that id is
    /// pending (already answered, timed out, or never sent).
    pub fn resolve(&self, id: u64, outcome: Outcome) -> bool {
        match self.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every pending request with [`McpError::Closed`].
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(
                "Failing {} pending request(s) for MCP server '{}'",
                drained.len(),
                self.server
            );
        }
        // Dropping the senders wakes every waiter with a closed channel.
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Wait for the response to `pending`, bounded by the configured timeout.
    pub async fn wait(&self, mut pending: PendingRequest<'_>, method: &str) -> Result<Value, McpError> {
        match tokio::time::timeout(self.timeout, &mut pending.rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(McpError::JsonRpc {
                server: self.server.clone(),
                code: error.code,
                message: error.message,
            }),
            Ok(Err(_)) => Err(McpError::Closed {
                name: self.server.clone(),
            }),
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Outcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
