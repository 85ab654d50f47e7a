//! TOML and environment configuration for Cairn.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > `~/.cairn/config.toml` > defaults

use cairn_hooks::HookConfig;
use cairn_mcp::McpConfig;
use cairn_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// The default max tokens for a response.
pub const DEFAULT_MAX_TOKENS: u32 = 16384;

/// Default cap on model round-trips per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Resolved configuration for a Cairn run.
#[derive(Debug, Clone)]
pub struct CairnConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_base_url: String,
    pub system_prompt: Option<String>,
    pub max_iterations: usize,
    pub config_dir: PathBuf,
    pub mcp: McpConfig,
    pub hooks: Vec<HookConfig>,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    pub max_iterations: Option<usize>,
    pub system_prompt: Option<String>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_iterations: Option<usize>,
}

impl CairnConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (`$CAIRN_CONFIG_DIR/config.toml`, default `~/.cairn/config.toml`)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"))?;
        Self::resolve(overrides, settings, config_dir, |key| std::env::var(key).ok())
    }

    /// Apply precedence rules to already-read sources. `env` looks up an
    /// environment variable.
    pub fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = overrides
            .api_key
            .or_else(|| env("ANTHROPIC_API_KEY"))
            .or(settings.api.api_key)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set ANTHROPIC_API_KEY or add to ~/.cairn/config.toml)".into(),
            })?;

        let model = overrides
            .model
            .or_else(|| env("CAIRN_MODEL"))
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = overrides
            .max_tokens
            .or(settings.api.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let api_base_url = env("ANTHROPIC_API_BASE_URL")
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let max_iterations = overrides
            .max_iterations
            .or(settings.agent.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_iterations".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(CairnConfig {
            api_key,
            model,
            max_tokens,
            api_base_url,
            system_prompt: settings.agent.system_prompt,
            max_iterations,
            config_dir,
            mcp: settings.mcp,
            hooks: settings.hooks,
        })
    }
}

/// Get the Cairn config directory path (~/.cairn/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CAIRN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cairn")
}

/// Read a TOML settings file. A missing file yields defaults; a malformed one
/// is an error.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("No settings at {}: {e}", path.display());
            return Ok(SettingsFile::default());
        }
    };
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
