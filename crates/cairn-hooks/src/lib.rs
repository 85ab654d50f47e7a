//! Tool lifecycle hooks for Cairn.
//!
//! The agent calls [`HookDispatcher::trigger`] before and after every tool
//! invocation. Hooks observe; they never change or block a tool's result.

mod command;
mod types;

pub use command::CommandHooks;
pub use types::{HookConfig, HookEvent, HookPayload};

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`HookDispatcher::trigger`].
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'a>>;

/// Why a hook did not complete cleanly.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Failed to encode hook payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Failed to spawn hook '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Hook '{command}' exited with code {code}")]
    Exit { command: String, code: i32 },

    #[error("Hook '{command}' was terminated by a signal")]
    Signal { command: String },

    #[error("Hook '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Failed to wait for hook '{command}': {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
}

/// Receives tool lifecycle events.
pub trait HookDispatcher: Send + Sync {
    fn trigger<'a>(&'a self, event: HookEvent, payload: &'a HookPayload) -> HookFuture<'a>;
}

/// Dispatcher that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl HookDispatcher for NoopHooks {
    fn trigger<'a>(&'a self, _event: HookEvent, _payload: &'a HookPayload) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
