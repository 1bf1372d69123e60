#![deny(missing_docs)]
//! External tool bridge over the Model Context Protocol.
//!
//! [`McpBridge`] connects to one or more MCP servers (stdio child
//! process or streamable HTTP), discovers their tools, and registers a
//! proxy for each into a [`ToolRuntime`]. A proxy forwards its arguments
//! unchanged to the owning session and stringifies the remote result.
//! On cleanup, sessions are closed in reverse start order, which also
//! terminates any child processes the transports spawned.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rmcp::ServiceExt;
use rmcp::model::{CallToolRequestParams, Content, RawContent};
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use tyler_tool::{ToolImpl, ToolOutput, ToolRuntime};
use tyler_types::{FunctionSpec, McpError, ToolError, ToolSpec};

/// Default time allowed for a server to come up and complete the
/// handshake.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// How to reach an external tool server.
#[derive(Debug, Clone)]
pub enum McpTransport {
    /// Spawn a child process and speak over its stdio.
    Stdio {
        /// Executable to run.
        command: String,
        /// Arguments for the executable.
        args: Vec<String>,
        /// Extra environment variables for the child.
        env: Vec<(String, String)>,
    },
    /// Connect over HTTP (server-sent events / streamable HTTP).
    Sse {
        /// The server endpoint.
        url: String,
    },
    /// WebSocket transport. No transport library is wired for it, so
    /// configs requesting it are refused gracefully.
    Websocket {
        /// The server endpoint.
        url: String,
    },
}

/// Configuration for one external tool server.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name; prefixes every discovered tool.
    pub name: String,
    /// Transport to connect over.
    pub transport: McpTransport,
    /// Whether a startup failure should be reported as an error (the
    /// bridge still continues with the remaining servers).
    pub required: bool,
    /// Time allowed for startup and handshake.
    pub startup_timeout: Duration,
}

impl McpServerConfig {
    /// A config with the default startup timeout, not required.
    #[must_use]
    pub fn new(name: impl Into<String>, transport: McpTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            required: false,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Mark the server as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

struct ServerSession {
    name: String,
    service: RunningService<RoleClient, ()>,
    tools: Vec<ToolSpec>,
}

/// Lifecycle manager for external tool servers.
#[derive(Default)]
pub struct McpBridge {
    sessions: Vec<ServerSession>,
}

impl McpBridge {
    /// Create a bridge with no connected servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to each configured server, discover its tools, and
    /// register proxies into the runtime.
    ///
    /// A server that fails to start or hand-shake is skipped; when it
    /// was `required`, the failure is logged as an error. The bridge
    /// always continues with the remaining servers.
    pub async fn initialize(
        &mut self,
        configs: Vec<McpServerConfig>,
        runtime: &mut ToolRuntime,
    ) {
        for config in configs {
            let name = config.name.clone();
            let required = config.required;
            match self.connect_and_discover(config, runtime).await {
                Ok(count) => {
                    info!(server = %name, tools = count, "connected MCP server");
                }
                Err(e) if required => {
                    error!(server = %name, error = %e, "failed to start required MCP server");
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "skipping MCP server");
                }
            }
        }
    }

    async fn connect_and_discover(
        &mut self,
        config: McpServerConfig,
        runtime: &mut ToolRuntime,
    ) -> Result<usize, McpError> {
        let service = connect(&config).await?;

        let discovered = service
            .list_all_tools()
            .await
            .map_err(|e| McpError::Initialization(e.to_string()))?;

        let peer = Arc::new(service.peer().clone());
        let mut tools = Vec::with_capacity(discovered.len());
        for tool in discovered {
            let original_name = tool.name.to_string();
            let namespaced = namespaced_tool_name(&config.name, &original_name);
            let parameters = serde_json::to_value(&*tool.input_schema)
                .unwrap_or_else(|_| json!({"type": "object"}));

            let definition = FunctionSpec {
                name: namespaced.clone(),
                description: tool.description.as_deref().map(String::from),
                parameters: Some(parameters),
            };
            tools.push(ToolSpec::function(definition.clone()));

            runtime.register_tool(
                namespaced.clone(),
                proxy(Arc::clone(&peer), original_name.clone()),
                definition,
            );

            let mut attributes = Map::new();
            attributes.insert("source".into(), json!("mcp"));
            attributes.insert("server".into(), json!(config.name));
            attributes.insert("original_name".into(), json!(original_name));
            runtime.register_tool_attributes(&namespaced, attributes);
        }

        let count = tools.len();
        self.sessions.push(ServerSession {
            name: config.name,
            service,
            tools,
        });
        Ok(count)
    }

    /// The discovered tool definitions, optionally restricted to a set
    /// of server names.
    #[must_use]
    pub fn get_tools_for_agent(&self, server_names: Option<&[&str]>) -> Vec<ToolSpec> {
        self.sessions
            .iter()
            .filter(|s| match server_names {
                Some(names) => names.contains(&s.name.as_str()),
                None => true,
            })
            .flat_map(|s| s.tools.iter().cloned())
            .collect()
    }

    /// Names of the connected servers, in start order.
    #[must_use]
    pub fn server_names(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.name.clone()).collect()
    }

    /// Close all sessions in reverse start order. Transports that
    /// spawned child processes terminate them on close.
    pub async fn cleanup(&mut self) {
        while let Some(session) = self.sessions.pop() {
            match session.service.cancel().await {
                Ok(_) => info!(server = %session.name, "closed MCP session"),
                Err(e) => {
                    error!(server = %session.name, error = %e, "error closing MCP session");
                }
            }
        }
    }
}

/// Connect over the configured transport within the startup timeout.
async fn connect(
    config: &McpServerConfig,
) -> Result<RunningService<RoleClient, ()>, McpError> {
    match &config.transport {
        McpTransport::Stdio { command, args, env } => {
            let mut cmd = tokio::process::Command::new(command);
            cmd.args(args);
            cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            let transport =
                TokioChildProcess::new(cmd).map_err(|e| McpError::Connection(e.to_string()))?;
            tokio::time::timeout(config.startup_timeout, ().serve(transport))
                .await
                .map_err(|_| {
                    McpError::Connection(format!(
                        "handshake timed out after {:?}",
                        config.startup_timeout
                    ))
                })?
                .map_err(|e| McpError::Connection(e.to_string()))
        }
        McpTransport::Sse { url } => {
            let transport = StreamableHttpClientTransport::from_uri(url.as_str());
            tokio::time::timeout(config.startup_timeout, ().serve(transport))
                .await
                .map_err(|_| {
                    McpError::Connection(format!(
                        "handshake timed out after {:?}",
                        config.startup_timeout
                    ))
                })?
                .map_err(|e| McpError::Connection(e.to_string()))
        }
        McpTransport::Websocket { .. } => Err(McpError::Transport(
            "websocket transport is not available".into(),
        )),
    }
}

/// Build a proxy implementation that forwards calls to the remote tool.
fn proxy(peer: Arc<Peer<RoleClient>>, original_name: String) -> ToolImpl {
    Arc::new(move |input: Value| {
        let peer = Arc::clone(&peer);
        let name = original_name.clone();
        Box::pin(async move {
            let arguments = match input {
                Value::Object(map) => Some(map),
                Value::Null => None,
                other => {
                    return Err(ToolError::InvalidInput(format!(
                        "expected object or null arguments, got {other}"
                    )));
                }
            };

            let result = peer
                .call_tool(CallToolRequestParams {
                    meta: None,
                    name: Cow::Owned(name),
                    arguments,
                    task: None,
                })
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

            if result.is_error == Some(true) {
                return Err(ToolError::ExecutionFailed(extract_text(&result.content)));
            }
            if let Some(structured) = result.structured_content {
                return Ok(ToolOutput::from(structured));
            }
            Ok(ToolOutput::from(Value::String(extract_text(
                &result.content,
            ))))
        })
    })
}

/// Concatenate the text blocks of an MCP result.
fn extract_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<server>-<tool>` with every non-alphanumeric character of the tool
/// name collapsed to `_` (dots in particular).
#[must_use]
pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    let sanitized: String = tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{server}-{sanitized}")
}

/// A map of discovered tool names per server, useful for diagnostics.
#[must_use]
pub fn tools_by_server(bridge: &McpBridge) -> HashMap<String, Vec<String>> {
    bridge
        .sessions
        .iter()
        .map(|s| {
            (
                s.name.clone(),
                s.tools.iter().map(|t| t.function.name.clone()).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespacing_collapses_non_alphanumerics() {
        assert_eq!(
            namespaced_tool_name("brave", "web.search"),
            "brave-web_search"
        );
        assert_eq!(namespaced_tool_name("fs", "read-file"), "fs-read_file");
        assert_eq!(namespaced_tool_name("fs", "plain"), "fs-plain");
    }

    #[test]
    fn websocket_transport_is_refused() {
        let config = McpServerConfig::new(
            "ws-server",
            McpTransport::Websocket {
                url: "ws://localhost:9000".into(),
            },
        );
        let err = futures_executor(connect(&config)).unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[test]
    fn empty_bridge_exposes_no_tools() {
        let bridge = McpBridge::new();
        assert!(bridge.get_tools_for_agent(None).is_empty());
        assert!(bridge.server_names().is_empty());
    }

    #[tokio::test]
    async fn failed_server_is_skipped_and_bridge_continues() {
        let mut bridge = McpBridge::new();
        let mut runtime = ToolRuntime::new();
        bridge
            .initialize(
                vec![McpServerConfig {
                    name: "broken".into(),
                    transport: McpTransport::Stdio {
                        command: "/nonexistent-mcp-server".into(),
                        args: vec![],
                        env: vec![],
                    },
                    required: true,
                    startup_timeout: Duration::from_millis(200),
                }],
                &mut runtime,
            )
            .await;

        assert!(bridge.server_names().is_empty());
        assert!(runtime.is_empty());
    }

    /// Drive a small future to completion on the current thread.
    fn futures_executor<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(future)
    }
}
