//! Tool trait and related types.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::ToolDefinition;
use crate::error::ToolError;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Working directory for tools that operate on the filesystem.
    pub cwd: PathBuf,
}

/// Result of executing a tool: the text handed back to the model plus an error flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            is_error: false,
        }
    }

    /// Create an error text output.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement, built-in or proxied.
pub trait Tool: Send + Sync {
    /// The unique name of this tool within a registry.
    fn name(&self) -> &str;

    /// The tool definition sent to the model (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input and context.
    ///
    /// The context is passed by value to avoid lifetime issues with dyn dispatch.
    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_>;
}
