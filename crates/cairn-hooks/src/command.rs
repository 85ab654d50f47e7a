//! Hook runner — executes shell commands on tool events.

use crate::types::{HookConfig, HookEvent, HookPayload};
use crate::{HookDispatcher, HookError, HookFuture};
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// What a hook sees on stdin.
#[derive(Serialize)]
struct HookInput<'a> {
    event: HookEvent,
    #[serde(flatten)]
    payload: &'a HookPayload,
}

/// Runs configured shell commands for matching events.
///
/// Matching hooks run sequentially. Every failure (spawn error, non-zero
/// exit, timeout) is logged and the remaining hooks still run; the first
/// failure is returned.
#[derive(Debug, Clone, Default)]
pub struct CommandHooks {
    hooks: Vec<HookConfig>,
}

impl CommandHooks {
    pub fn new(hooks: Vec<HookConfig>) -> Self {
        Self { hooks }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl HookDispatcher for CommandHooks {
    fn trigger<'a>(&'a self, event: HookEvent, payload: &'a HookPayload) -> HookFuture<'a> {
        Box::pin(async move {
            let input = serde_json::to_string(&HookInput { event, payload })?;
            let mut first_failure = None;

            for hook in self.hooks.iter().filter(|h| h.event == event) {
                if let Err(e) = run_hook(hook, &input).await {
                    tracing::warn!("{} hook failed: {e}", event.as_str());
                    first_failure.get_or_insert(e);
                }
            }

            match first_failure {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

async fn run_hook(hook: &HookConfig, input: &str) -> Result<(), HookError> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&hook.command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| HookError::Spawn {
            command: hook.command.clone(),
            source,
        })?;

    // A hook that ignores stdin may close it early; that is not a failure.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(input.as_bytes()).await;
        let _ = stdin.shutdown().await;
    }

    let timeout = Duration::from_millis(hook.timeout_ms);
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                tracing::debug!("hook '{}' stderr: {}", hook.command, stderr.trim());
            }
            match output.status.code() {
                Some(0) => Ok(()),
                Some(code) => Err(HookError::Exit {
                    command: hook.command.clone(),
                    code,
                }),
                None => Err(HookError::Signal {
                    command: hook.command.clone(),
                }),
            }
        }
        Ok(Err(source)) => Err(HookError::Wait {
            command: hook.command.clone(),
            source,
        }),
        // The child is killed when the dropped future releases it.
        Err(_) => Err(HookError::Timeout {
            command: hook.command.clone(),
            timeout_ms: hook.timeout_ms,
        }),
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn hook(event: HookEvent, command: &str) -> HookConfig {
        HookConfig {
            event,
            command: command.to_string(),
            timeout_ms: 5000,
        }
    }

    fn payload() -> HookPayload {
        HookPayload::before_tool("Bash", serde_json::json!({"command": "ls"}))
    }

    #[tokio::test]
    async fn successful_hook() {
        let hooks = CommandHooks::new(vec![hook(HookEvent::BeforeTool, "exit 0")]);
        assert!(hooks.trigger(HookEvent::BeforeTool, &payload()).await.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let hooks = CommandHooks::new(vec![hook(HookEvent::BeforeTool, "exit 3")]);
        let err = hooks
            .trigger(HookEvent::BeforeTool, &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Exit { code: 3, .. }));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let hooks = CommandHooks::new(vec![HookConfig {
            event: HookEvent::BeforeTool,
            command: "sleep 10".to_string(),
            timeout_ms: 100,
        }]);
        let err = hooks
            .trigger(HookEvent::BeforeTool, &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Timeout { timeout_ms: 100, .. }));
    }

    #[tokio::test]
    async fn non_matching_event_is_skipped() {
        let hooks = CommandHooks::new(vec![hook(HookEvent::AfterTool, "exit 1")]);
        assert!(hooks.trigger(HookEvent::BeforeTool, &payload()).await.is_ok());
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let hooks = CommandHooks::new(vec![
            hook(HookEvent::AfterTool, "exit 1"),
            hook(HookEvent::AfterTool, &format!("touch {}", marker.display())),
        ]);
        let payload = HookPayload::after_tool("Bash", serde_json::json!({}), "ok", false);
        assert!(hooks.trigger(HookEvent::AfterTool, &payload).await.is_err());
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn payload_is_written_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("input.json");
        let hooks = CommandHooks::new(vec![hook(
            HookEvent::AfterTool,
            &format!("cat > {}", out.display()),
        )]);
        let payload = HookPayload::after_tool("Read", serde_json::json!({"file_path": "x"}), "contents", false);
        hooks.trigger(HookEvent::AfterTool, &payload).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["event"], "after_tool");
        assert_eq!(written["tool_name"], "Read");
        assert_eq!(written["tool_input"]["file_path"], "x");
        assert_eq!(written["tool_output"], "contents");
        assert_eq!(written["is_error"], false);
    }
}
