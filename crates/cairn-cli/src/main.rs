//! Cairn CLI — runs one prompt through the agent and prints the answer.

use anyhow::{Context, Result, bail};
use cairn_api::AnthropicClient;
use cairn_config::{CairnConfig, CliOverrides};
use cairn_core::{Agent, AgentEvent, RunOutcome, RunSummary};
use cairn_hooks::{CommandHooks, HookDispatcher, NoopHooks};
use cairn_mcp::McpManager;
use cairn_session::{JsonFileSessionStore, Session, SessionStore};
use cairn_tools::ToolRegistry;
use cairn_types::{Message, Usage};
use clap::Parser;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cairn", version, about = "A coding agent with MCP tool servers")]
struct Cli {
    /// Send a single prompt and print the response (reads stdin when omitted)
    #[arg(short, long)]
    print: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Maximum tokens in each response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// API key (overrides ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum model round-trips before stopping
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Do not save the conversation under ~/.cairn/sessions
    #[arg(long)]
    no_session: bool,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let prompt = match cli.print {
        Some(prompt) => prompt,
        None => read_stdin_prompt()?,
    };

    let config = CairnConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        max_tokens: cli.max_tokens,
        max_iterations: cli.max_iterations,
    })
    .context("Failed to load configuration")?;

    let client = AnthropicClient::new(&config.api_key, &config.api_base_url)
        .context("Failed to create API client")?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let registry = Arc::new(ToolRegistry::with_builtins());
    let mut manager = McpManager::start(&config.mcp, Arc::clone(&registry)).await;
    for (server, tools) in manager.server_summary() {
        tracing::info!("MCP server '{server}' provides {tools} tools");
    }

    let session_store = if cli.no_session {
        None
    } else {
        let session = Session::new(&config.model, cwd.display().to_string());
        match JsonFileSessionStore::new(&config.config_dir, session).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                eprintln!("Warning: sessions disabled: {e}");
                None
            }
        }
    };

    let agent = create_agent(client, Arc::clone(&registry), &config, &cwd, session_store.clone());
    let mut messages = Vec::new();
    let result = run_agent(&agent, &mut messages, prompt).await;

    manager.shutdown().await;

    let summary = result?;
    print_usage(&summary.usage);
    if let Some(store) = session_store {
        eprintln!("Session saved to {}", store.path().display());
    }
    if summary.outcome != RunOutcome::Completed {
        tracing::info!("Run ended with {:?} after {} iterations", summary.outcome, summary.iterations);
    }
    Ok(())
}

fn create_agent(
    client: AnthropicClient,
    registry: Arc<ToolRegistry>,
    config: &CairnConfig,
    cwd: &Path,
    session_store: Option<Arc<JsonFileSessionStore>>,
) -> Agent {
    let hooks: Arc<dyn HookDispatcher> = if config.hooks.is_empty() {
        Arc::new(NoopHooks)
    } else {
        Arc::new(CommandHooks::new(config.hooks.clone()))
    };

    let mut agent = Agent::new(
        Arc::new(client),
        registry,
        config.model.clone(),
        config.max_tokens,
        cwd.to_path_buf(),
    )
    .with_hooks(hooks)
    .with_max_iterations(config.max_iterations)
    .with_system_prompt(
        config
            .system_prompt
            .clone()
            .unwrap_or_else(|| system_prompt(cwd)),
    );
    if let Some(store) = session_store {
        agent = agent.with_session_store(store as Arc<dyn SessionStore>);
    }
    agent
}

/// Run the agent loop and print its output.
async fn run_agent(agent: &Agent, messages: &mut Vec<Message>, prompt: String) -> Result<RunSummary> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = agent
        .run(messages, prompt, |event| match event {
            AgentEvent::Text(text) => {
                let _ = write!(out, "{text}");
                let _ = out.flush();
            }
            AgentEvent::ToolStart { name, .. } => {
                let _ = writeln!(out);
                let _ = writeln!(out, "  [tool: {name}]");
            }
            AgentEvent::ToolEnd {
                name,
                output,
                is_error,
                ..
            } => {
                if is_error {
                    let _ = writeln!(out, "  [tool {name} error: {output}]");
                } else {
                    let _ = writeln!(out, "  [tool {name} done: {output}]");
                }
            }
            AgentEvent::Warning(w) => {
                let _ = writeln!(io::stderr(), "Warning: {w}");
            }
            AgentEvent::Usage(_) => {}
            AgentEvent::Done(_) => {
                let _ = writeln!(out);
            }
            AgentEvent::Error(e) => {
                let _ = writeln!(io::stderr(), "Error: {e}");
            }
        })
        .await
        .context("Agent run failed")?;

    Ok(summary)
}

fn read_stdin_prompt() -> Result<String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        bail!("no prompt given: pass --print \"<prompt>\" or pipe one on stdin");
    }
    let mut prompt = String::new();
    stdin
        .read_to_string(&mut prompt)
        .context("Failed to read prompt from stdin")?;
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }
    Ok(prompt)
}

fn system_prompt(cwd: &Path) -> String {
    format!(
        "You are Cairn, a coding agent running in a terminal. \
         You help users with software engineering tasks by reading and writing \
         files, running commands, and calling tools from connected MCP servers.\n\n\
         Current working directory: {}\n\n\
         Use the available tools to assist the user. Be concise and helpful.",
        cwd.display()
    )
}

fn print_usage(usage: &Usage) {
    eprintln!(
        "Tokens — input: {}, output: {}",
        usage.input_tokens, usage.output_tokens
    );
}
