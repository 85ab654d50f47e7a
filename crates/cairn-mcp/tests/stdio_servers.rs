//! Manager + stdio transport against scripted shell MCP servers.

use cairn_mcp::{ConnectionState, McpConfig, McpManager, McpServerConfig};
use cairn_tools::ToolRegistry;
use cairn_types::ToolContext;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// A server that answers requests 1..=3 in order (initialize, tools/list,
/// tools/call) and exits when its stdin closes.
fn scripted_server(answer: &str) -> McpServerConfig {
    let script = format!(
        r#"read l; echo '{{"jsonrpc":"2.0","id":1,"result":{{"protocolVersion":"2024-11-05","capabilities":{{"tools":{{}}}},"serverInfo":{{"name":"sh"}}}}}}'
read l
read l; echo '{{"jsonrpc":"2.0","id":2,"result":{{"tools":[{{"name":"search","description":"Search things","inputSchema":{{"type":"object"}}}}]}}}}'
read l; echo '{{"jsonrpc":"2.0","id":3,"result":{{"content":[{{"type":"text","text":"{answer}"}}]}}}}'
read l"#
    );
    McpServerConfig::stdio("sh", vec!["-c".to_string(), script]).with_timeout(5000)
}

fn ctx() -> ToolContext {
    ToolContext {
        cwd: PathBuf::from("/tmp"),
    }
}

#[tokio::test]
async fn two_servers_with_the_same_tool_name() {
    let mut config = McpConfig::default();
    config.servers.insert("serverA".into(), scripted_server("from A"));
    config.servers.insert("serverB".into(), scripted_server("from B"));
    config.servers.insert(
        "missing".into(),
        McpServerConfig::stdio("nonexistent_mcp_server_xyz", vec![]),
    );

    let registry = Arc::new(ToolRegistry::with_builtins());
    let mut manager = McpManager::start(&config, Arc::clone(&registry)).await;

    let names: Vec<_> = manager
        .connections()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, vec!["serverA", "serverB"]);
    assert!(registry.has_tool("serverA__search"));
    assert!(registry.has_tool("serverB__search"));

    let def = registry
        .definitions()
        .into_iter()
        .find(|d| d.name == "serverB__search")
        .unwrap();
    assert_eq!(def.description, "Search things");

    let a = registry.execute("serverA__search", json!({"q": "x"}), ctx()).await;
    let b = registry.execute("serverB__search", json!({"q": "x"}), ctx()).await;
    assert_eq!(a.content, "from A");
    assert_eq!(b.content, "from B");
    assert!(!a.is_error && !b.is_error);

    let conn = manager.connection("serverA").unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.server_info().unwrap().name, "sh");

    manager.shutdown().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(registry.names(), vec!["Bash", "Read", "Write"]);
}

#[tokio::test]
async fn server_that_never_answers_fails_at_handshake() {
    let mut config = McpConfig::default();
    config.servers.insert(
        "silent".into(),
        McpServerConfig::stdio("sleep", vec!["10".into()]).with_timeout(200),
    );

    let registry = Arc::new(ToolRegistry::new());
    let manager = McpManager::start(&config, Arc::clone(&registry)).await;
    assert_eq!(manager.server_count(), 0);
    assert!(registry.is_empty());
}
