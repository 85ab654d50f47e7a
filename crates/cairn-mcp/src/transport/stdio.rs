//! Stdio transport for MCP server communication.
//!
//! Spawns a child process and exchanges newline-delimited JSON-RPC frames
//! over its stdin/stdout. The child's stderr is forwarded to the log.

use super::dispatch::{Dispatcher, INBOUND_CAPACITY, enqueue_frame};
use super::framing::LineBuffer;
use super::{Correlator, EVENT_CAPACITY, Transport, TransportEvent, TransportFuture};
use crate::error::McpError;
use crate::jsonrpc::OutgoingMessage;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

/// How long a child gets to exit after its stdin closes before it is killed.
const GRACEFUL_EXIT: Duration = Duration::from_secs(5);

/// Async stdio transport for an MCP server process.
pub struct StdioTransport {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    correlator: Arc<Correlator>,
    events: broadcast::Sender<TransportEvent>,
    process: Mutex<Option<ChildProcess>>,
}

/// A running child and the tasks that service it.
struct ChildProcess {
    child: Child,
    write_tx: mpsc::Sender<String>,
    io_tasks: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    pub fn new(
        name: &str,
        command: &str,
        args: Vec<String>,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args,
            env,
            correlator: Arc::new(Correlator::new(name, timeout)),
            events,
            process: Mutex::new(None),
        }
    }

    fn spawn(&self) -> Result<ChildProcess, McpError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::SpawnFailed {
                name: self.name.clone(),
                source: e,
            })?;

        let missing = |stream: &str| McpError::Connect {
            name: self.name.clone(),
            message: format!("child {stream} was not captured"),
        };
        let mut stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let mut stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        // Writer: drains the frame channel into the child's stdin. When every
        // sender is gone the loop ends and stdin is closed.
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let name = self.name.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(frame.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if let Err(e) = written.await {
                    tracing::debug!("MCP server '{name}' stdin closed: {e}");
                    break;
                }
            }
        });

        // Reader: splits stdout into frames and queues them for dispatch.
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let name = self.name.clone();
        let reader = tokio::spawn(async move {
            let mut lines = LineBuffer::new();
            let mut chunk = vec![0u8; 8192];
            loop {
                let n = match stdout.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!("MCP server '{name}' stdout read failed: {e}");
                        break;
                    }
                };
                for frame in lines.feed(&chunk[..n]) {
                    if !enqueue_frame(&name, &frame, &inbound_tx).await {
                        return;
                    }
                }
            }
            if let Some(frame) = lines.finish() {
                enqueue_frame(&name, &frame, &inbound_tx).await;
            }
        });

        let name = self.name.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!("[mcp:{name}] {line}");
            }
        });

        let dispatcher = Dispatcher {
            server: self.name.clone(),
            correlator: Arc::clone(&self.correlator),
            events: self.events.clone(),
            replies: write_tx.downgrade(),
        };
        tokio::spawn(dispatcher.run(inbound_rx));

        Ok(ChildProcess {
            child,
            write_tx,
            io_tasks: vec![writer, reader, stderr_task],
        })
    }
}

impl Transport for StdioTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let mut process = self.process.lock().await;
            if process.is_none() {
                *process = Some(self.spawn()?);
                tracing::debug!("Spawned MCP server '{}' ({})", self.name, self.command);
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let Some(process) = self.process.lock().await.take() else {
                return Ok(());
            };
            let ChildProcess {
                mut child,
                write_tx,
                io_tasks,
            } = process;

            drop(write_tx);
            match tokio::time::timeout(GRACEFUL_EXIT, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(
                        "MCP server '{}' did not exit within {}s, killing it",
                        self.name,
                        GRACEFUL_EXIT.as_secs()
                    );
                    let _ = child.kill().await;
                }
            }

            // Aborting the reader drops the inbound sender, which lets the
            // dispatcher drain and announce the close.
            for task in io_tasks {
                task.abort();
            }
            self.correlator.fail_all();
            Ok(())
        })
    }

    fn send(&self, message: OutgoingMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let frame = message.to_frame()?;
            let write_tx = match self.process.lock().await.as_ref() {
                Some(process) => process.write_tx.clone(),
                None => {
                    return Err(McpError::NotConnected {
                        name: self.name.clone(),
                    });
                }
            };
            write_tx.send(frame).await.map_err(|_| McpError::Closed {
                name: self.name.clone(),
            })
        })
    }

    fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport(command: &str, args: &[&str], timeout_ms: u64) -> StdioTransport {
        StdioTransport::new(
            "test",
            command,
            args.iter().map(|s| s.to_string()).collect(),
            HashMap::new(),
            Duration::from_millis(timeout_ms),
        )
    }

    fn sh(script: &str, timeout_ms: u64) -> StdioTransport {
        transport("sh", &["-c", script], timeout_ms)
    }

    #[tokio::test]
    async fn connect_and_disconnect_cat() {
        let t = transport("cat", &[], 5000);
        t.connect().await.unwrap();
        t.notify("notifications/initialized", None).await.unwrap();
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn spawn_nonexistent_command_fails() {
        let t = transport("this_command_does_not_exist_xyz123", &[], 5000);
        match t.connect().await {
            Err(McpError::SpawnFailed { name, .. }) => assert_eq!(name, "test"),
            other => panic!("Expected SpawnFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_before_connect_is_rejected() {
        let t = transport("cat", &[], 5000);
        let err = t.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected { .. }));
        assert_eq!(t.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn request_response_roundtrip() {
        let t = sh(
            r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'; sleep 1"#,
            5000,
        );
        t.connect().await.unwrap();
        let result = t.request("test/method", Some(json!({}))).await.unwrap();
        assert_eq!(result["ok"], true);
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_does_not_break_the_stream() {
        let t = sh(
            r#"read line; echo '{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}'; echo 'garbage {'; echo '{"jsonrpc":"2.0","id":1,"result":"fine"}'; sleep 1"#,
            5000,
        );
        let mut events = t.subscribe();
        t.connect().await.unwrap();
        let result = t.request("test/method", None).await.unwrap();
        assert_eq!(result, "fine");

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            TransportEvent::Notification(super::super::ServerNotification::ToolsListChanged)
        );
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn timeout_fires_on_unresponsive_server() {
        let t = transport("sleep", &["10"], 100);
        t.connect().await.unwrap();
        match t.request("test/method", None).await {
            Err(McpError::Timeout { timeout_ms, .. }) => assert_eq!(timeout_ms, 100),
            other => panic!("Expected Timeout, got: {other:?}"),
        }
        assert_eq!(t.correlator().pending_count(), 0);
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn process_exit_fails_pending_and_emits_closed() {
        let t = sh("read line; exit 0", 5000);
        let mut events = t.subscribe();
        t.connect().await.unwrap();

        let err = t.request("test/method", None).await.unwrap_err();
        assert!(matches!(err, McpError::Closed { .. }));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, TransportEvent::Closed);
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn ping_from_server_is_answered() {
        // The server pings us, then echoes our reply back as a log notification.
        let t = sh(
            r#"echo '{"jsonrpc":"2.0","id":"p","method":"ping"}'; read reply; printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"data":%s}}\n' "$reply"; sleep 1"#,
            5000,
        );
        let mut events = t.subscribe();
        t.connect().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let TransportEvent::Notification(super::super::ServerNotification::Log { data, .. }) = event
        else {
            panic!("expected log notification, got {event:?}");
        };
        assert_eq!(data["id"], "p");
        assert_eq!(data["result"], json!({}));
        t.disconnect().await.unwrap();
    }
}
