//! Tool registry for name-based dispatch.
//!
//! The registry is shared between the MCP manager (which writes proxied tools
//! during startup and shutdown) and the agent loop (which only reads), so the
//! map sits behind a lock and every method takes `&self`.

use cairn_types::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type ToolMap = BTreeMap<String, Arc<dyn Tool>>;

/// Registry of available tools, built-in and proxied.
pub struct ToolRegistry {
    tools: RwLock<ToolMap>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a registry with all built-in tools.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(super::ReadTool));
        registry.register(Arc::new(super::WriteTool));
        registry.register(Arc::new(super::BashTool::new()));
        registry
    }

    /// Register a tool, returning the entry it replaced (if any).
    pub fn register(&self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        let previous = self.write().insert(name.clone(), tool);
        if previous.is_some() {
            tracing::debug!("Tool '{name}' re-registered, previous entry replaced");
        }
        previous
    }

    /// Remove a tool by name.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.write().remove(name)
    }

    /// Remove `tool` only if it is still the entry registered under its name.
    /// Returns false when the name is free or now belongs to another tool.
    pub fn unregister_entry(&self, tool: &Arc<dyn Tool>) -> bool {
        let mut tools = self.write();
        match tools.get(tool.name()) {
            Some(current) if Arc::ptr_eq(current, tool) => {
                tools.remove(tool.name());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().get(name).cloned()
    }

    /// All registered tools, ordered by name.
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Tool definitions for the model, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.read().values().map(|t| t.definition()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Execute a tool by name.
    ///
    /// Never fails: unknown tools, tool errors and panics all come back as an
    /// error [`ToolOutput`] that can be handed to the model.
    pub async fn execute(&self, name: &str, input: serde_json::Value, ctx: ToolContext) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            tracing::warn!("Model requested unknown tool '{name}'");
            return ToolOutput::error(
                ToolError::UnknownTool {
                    name: name.to_string(),
                }
                .to_string(),
            );
        };

        match AssertUnwindSafe(tool.execute(input, ctx)).catch_unwind().await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!("Tool '{name}' failed: {e}");
                ToolOutput::error(e.to_string())
            }
            Err(_) => {
                tracing::error!("Tool '{name}' panicked");
                ToolOutput::error(format!("Tool '{name}' panicked during execution"))
            }
        }
    }

    // A panicking writer cannot leave the map half-updated, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, ToolMap> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ToolMap> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
