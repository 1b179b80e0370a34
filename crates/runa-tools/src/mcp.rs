// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bridge from one external MCP server to a single agent tool.
//!
//! The server may expose many sub-tools; the bridge publishes them behind
//! one schema with a `tool_name` discriminator so the model-facing catalog
//! stays small.  The transport is chosen from the target string: an
//! `…/sse` URL speaks SSE, any other HTTP URL speaks streamable HTTP, and
//! everything else is treated as a command line to spawn and talk MCP with
//! over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, ClientInfo, Implementation};
use rmcp::serve_client;
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::sse_client::SseClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Tool;

/// One agent tool wrapping one connected MCP server.
pub struct McpTool {
    name: String,
    description: String,
    /// Sub-tool names in the order the server listed them.
    tool_names: Vec<String>,
    tools: HashMap<String, rmcp::model::Tool>,
    peer: Peer<RoleClient>,
    /// Keeps the transport alive; dropping it kills a stdio child process.
    /// Taken out by `release`.
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
}

/// How to reach an MCP server, derived from the user-supplied target string.
#[derive(Debug, Clone, PartialEq)]
pub enum McpTarget {
    Sse(String),
    StreamableHttp(String),
    Stdio { command: String, args: Vec<String> },
}

/// Split a target string into a transport selection.
pub fn parse_target(target: &str) -> anyhow::Result<McpTarget> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        bail!("empty MCP target");
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        if trimmed.trim_end_matches('/').ends_with("/sse") {
            return Ok(McpTarget::Sse(trimmed.to_string()));
        }
        return Ok(McpTarget::StreamableHttp(trimmed.to_string()));
    }
    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap().to_string();
    Ok(McpTarget::Stdio {
        command,
        args: parts.map(str::to_string).collect(),
    })
}

impl McpTool {
    /// Connect to the server behind `target`, perform the MCP handshake,
    /// and cache its tool catalog.  `name` is the public tool name assigned
    /// by the embedder (`mcp`, `mcp_<label>`, `mcp<N>`).
    pub async fn connect(name: impl Into<String>, target: &str) -> anyhow::Result<Self> {
        let name = name.into();
        let client_info = ClientInfo {
            protocol_version: Default::default(),
            capabilities: Default::default(),
            client_info: Implementation {
                name: "runa".into(),
                title: Some("runa agent".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
        };

        let service = match parse_target(target)? {
            McpTarget::Stdio { command, args } => {
                info!(tool = %name, command = %command, ?args, "spawning MCP server");
                let mut cmd = Command::new(&command);
                cmd.args(&args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null());
                let transport = TokioChildProcess::new(cmd)
                    .with_context(|| format!("cannot spawn MCP server '{command}'"))?;
                serve_client(client_info, transport)
                    .await
                    .context("MCP initialisation handshake failed")?
            }
            McpTarget::Sse(url) => {
                info!(tool = %name, url = %url, "connecting to MCP server over SSE");
                let transport = SseClientTransport::start(url.clone())
                    .await
                    .with_context(|| format!("cannot open SSE transport to {url}"))?;
                serve_client(client_info, transport)
                    .await
                    .context("MCP initialisation handshake failed")?
            }
            McpTarget::StreamableHttp(url) => {
                info!(tool = %name, url = %url, "connecting to MCP server over streamable HTTP");
                let config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                let transport = StreamableHttpClientTransport::from_config(config);
                serve_client(client_info, transport)
                    .await
                    .context("MCP initialisation handshake failed")?
            }
        };

        let peer = service.peer().clone();
        let listed = peer
            .list_all_tools()
            .await
            .context("MCP ListTools failed")?;

        let tool_names: Vec<String> = listed.iter().map(|t| t.name.to_string()).collect();
        let tools: HashMap<String, rmcp::model::Tool> = listed
            .into_iter()
            .map(|t| (t.name.to_string(), t))
            .collect();
        info!(tool = %name, sub_tools = tool_names.len(), "connected to MCP server");

        Ok(Self {
            description: build_description(&tool_names),
            tool_names,
            tools,
            peer,
            service: Mutex::new(Some(service)),
            name,
        })
    }

    /// Sub-tool names discovered at connect time.
    pub fn sub_tool_names(&self) -> &[String] {
        &self.tool_names
    }
}

/// Model-facing description listing the discovered sub-tools.
pub(crate) fn build_description(tool_names: &[String]) -> String {
    if tool_names.is_empty() {
        return "Call a tool on a connected MCP server. The server currently \
                exposes no tools."
            .to_string();
    }
    format!(
        "Call a tool on a connected MCP server. Set 'tool_name' to one of the \
         available tools and put that tool's inputs in 'arguments'. Available \
         tools: {}",
        tool_names.join(", ")
    )
}

pub(crate) fn build_schema(tool_names: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "tool_name": {
                "type": "string",
                "description": "Name of the MCP tool to call",
                "enum": tool_names,
            },
            "arguments": {
                "type": "object",
                "description": "Arguments for the selected tool",
            }
        },
        "required": ["tool_name"]
    })
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        build_schema(&self.tool_names)
    }

    async fn invoke(&self, args: &Value) -> anyhow::Result<String> {
        let tool_name = match args.get("tool_name").and_then(Value::as_str) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => bail!("tool_name parameter required"),
        };
        if !self.tools.contains_key(&tool_name) {
            bail!(
                "MCP server has no tool '{tool_name}' (available: {})",
                self.tool_names.join(", ")
            );
        }

        let arguments = match args.get("arguments") {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        };

        debug!(server = %self.name, tool = %tool_name, "calling MCP tool");
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: tool_name.clone().into(),
                arguments,
            })
            .await
            .with_context(|| format!("MCP call to '{tool_name}' failed"))?;

        let text: String = result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.to_string()))
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            bail!(
                "MCP tool '{tool_name}' reported an error: {}",
                if text.is_empty() { "(no detail)" } else { &text }
            );
        }
        if text.is_empty() {
            return Ok("(no output)".to_string());
        }
        Ok(text)
    }

    /// Cancel the running service; for a stdio transport this terminates
    /// the child process.
    async fn release(&self) {
        if let Some(service) = self.service.lock().await.take() {
            debug!(tool = %self.name, "shutting down MCP server connection");
            if let Err(e) = service.cancel().await {
                warn!(tool = %self.name, "MCP shutdown error: {e}");
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Transport selection ───────────────────────────────────────────────────

    #[test]
    fn sse_url_selects_sse_transport() {
        assert_eq!(
            parse_target("https://mcp.example.com/v1/sse").unwrap(),
            McpTarget::Sse("https://mcp.example.com/v1/sse".into())
        );
    }

    #[test]
    fn sse_url_with_trailing_slash_still_matches() {
        assert!(matches!(
            parse_target("http://localhost:9000/sse/").unwrap(),
            McpTarget::Sse(_)
        ));
    }

    #[test]
    fn plain_http_url_selects_streamable_http() {
        assert_eq!(
            parse_target("http://localhost:9000/mcp").unwrap(),
            McpTarget::StreamableHttp("http://localhost:9000/mcp".into())
        );
    }

    #[test]
    fn command_line_selects_stdio() {
        assert_eq!(
            parse_target("npx -y @modelcontextprotocol/server-filesystem /tmp").unwrap(),
            McpTarget::Stdio {
                command: "npx".into(),
                args: vec![
                    "-y".into(),
                    "@modelcontextprotocol/server-filesystem".into(),
                    "/tmp".into()
                ],
            }
        );
    }

    #[test]
    fn bare_command_has_no_args() {
        assert_eq!(
            parse_target("my-mcp-server").unwrap(),
            McpTarget::Stdio {
                command: "my-mcp-server".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn empty_target_is_rejected() {
        assert!(parse_target("   ").is_err());
    }

    // ── Catalog rendering ─────────────────────────────────────────────────────

    #[test]
    fn description_lists_sub_tools() {
        let names = vec!["read_file".to_string(), "list_dir".to_string()];
        let d = build_description(&names);
        assert!(d.contains("read_file, list_dir"));
    }

    #[test]
    fn description_handles_empty_catalog() {
        let d = build_description(&[]);
        assert!(d.contains("no tools"));
    }

    #[test]
    fn schema_enumerates_discovered_names() {
        let names = vec!["a".to_string(), "b".to_string()];
        let schema = build_schema(&names);
        assert_eq!(schema["properties"]["tool_name"]["enum"], json!(["a", "b"]));
        assert_eq!(schema["required"], json!(["tool_name"]));
    }

    #[test]
    fn schema_declares_optional_arguments_object() {
        let schema = build_schema(&["x".to_string()]);
        assert_eq!(schema["properties"]["arguments"]["type"], "object");
        let required = schema["required"].as_array().unwrap();
        assert!(!required.iter().any(|v| v == "arguments"));
    }
}
