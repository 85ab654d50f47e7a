//! Configuration types for MCP servers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn default_timeout() -> u64 {
    30_000
}

fn default_enabled() -> bool {
    true
}

/// Top-level MCP configuration, keyed by server name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Per-request timeout in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Disabled servers are skipped at startup.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// How to reach a server. A `command` selects a child process, a `url` selects
/// an SSE endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl McpServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportConfig::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
            timeout_ms: default_timeout(),
            enabled: true,
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::Sse {
                url: url.into(),
                headers: HashMap::new(),
            },
            timeout_ms: default_timeout(),
            enabled: true,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}
