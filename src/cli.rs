// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::Parser;

/// An autonomous tool-using AI agent for local LLMs.
#[derive(Debug, Parser)]
#[command(name = "runa", version, about)]
pub struct Cli {
    /// Model identifier for the chat backend
    #[arg(long, default_value = "qwen2.5")]
    pub model: String,

    /// OpenAI-compatible base URL of the inference server
    #[arg(long, default_value = "http://localhost:11434/v1")]
    pub base_url: String,

    /// Maximum model ↔ tool round-trips per user turn
    #[arg(long, default_value_t = 10)]
    pub max_iter: u32,

    /// Enable the wiki tool and index the HTML export at this path
    #[arg(long, value_name = "PATH")]
    pub wiki: Option<PathBuf>,

    /// Qdrant URL backing the wiki index
    #[arg(long, default_value = "http://localhost:6333")]
    pub qdrant: String,

    /// Index the wiki and exit without starting the REPL
    #[arg(long)]
    pub index_only: bool,

    /// Attach an MCP server: [label:]target where target is a command line,
    /// an http(s) URL ending in /sse, or another http(s) URL (repeatable)
    #[arg(long = "mcp", value_name = "SPEC")]
    pub mcp: Vec<String>,

    /// Embedding model for wiki indexing and search
    #[arg(long, default_value = "nomic-embed-text")]
    pub embed_model: String,

    /// Vision model used to describe wiki images
    #[arg(long, default_value = "llava")]
    pub vision_model: String,

    /// Disable streaming output
    #[arg(long)]
    pub no_stream: bool,

    /// Verbose logging to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// One `--mcp` argument, split into its optional label and the transport
/// target.
#[derive(Debug, Clone, PartialEq)]
pub struct McpSpec {
    pub label: Option<String>,
    pub target: String,
}

/// Parse `[label:]target`.
///
/// A prefix only counts as a label when it looks like one: a URL scheme
/// (`http://…`) or anything containing whitespace or slashes is part of
/// the target.
pub fn parse_mcp_spec(spec: &str) -> McpSpec {
    if let Some((label, rest)) = spec.split_once(':') {
        let looks_like_label = !label.is_empty()
            && !rest.starts_with("//")
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if looks_like_label {
            return McpSpec {
                label: Some(label.to_string()),
                target: rest.to_string(),
            };
        }
    }
    McpSpec {
        label: None,
        target: spec.to_string(),
    }
}

/// Assign public tool names: `mcp_<label>` for labelled servers, `mcp`,
/// `mcp2`, `mcp3`, … for unlabelled ones.
pub fn mcp_tool_names(specs: &[McpSpec]) -> Vec<String> {
    let mut names = Vec::with_capacity(specs.len());
    let mut unlabelled = 0usize;
    for spec in specs {
        match &spec.label {
            Some(label) => names.push(format!("mcp_{label}")),
            None => {
                unlabelled += 1;
                if unlabelled == 1 {
                    names.push("mcp".to_string());
                } else {
                    names.push(format!("mcp{unlabelled}"));
                }
            }
        }
    }
    names
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_stdio_spec() {
        let s = parse_mcp_spec("files:npx -y @modelcontextprotocol/server-filesystem /tmp");
        assert_eq!(s.label.as_deref(), Some("files"));
        assert_eq!(s.target, "npx -y @modelcontextprotocol/server-filesystem /tmp");
    }

    #[test]
    fn url_scheme_is_not_a_label() {
        let s = parse_mcp_spec("http://localhost:9000/mcp");
        assert!(s.label.is_none());
        assert_eq!(s.target, "http://localhost:9000/mcp");
    }

    #[test]
    fn labelled_url_spec() {
        let s = parse_mcp_spec("search:https://mcp.example.com/sse");
        assert_eq!(s.label.as_deref(), Some("search"));
        assert_eq!(s.target, "https://mcp.example.com/sse");
    }

    #[test]
    fn bare_command_has_no_label() {
        let s = parse_mcp_spec("my-mcp-server --flag");
        assert!(s.label.is_none());
    }

    #[test]
    fn unlabelled_servers_are_numbered_from_the_second() {
        let specs = vec![
            parse_mcp_spec("server-one"),
            parse_mcp_spec("server-two"),
            parse_mcp_spec("server-three"),
        ];
        assert_eq!(mcp_tool_names(&specs), vec!["mcp", "mcp2", "mcp3"]);
    }

    #[test]
    fn labelled_and_unlabelled_mix() {
        let specs = vec![
            parse_mcp_spec("files:server-a"),
            parse_mcp_spec("server-b"),
            parse_mcp_spec("search:server-c"),
        ];
        assert_eq!(
            mcp_tool_names(&specs),
            vec!["mcp_files", "mcp", "mcp_search"]
        );
    }

    #[test]
    fn cli_defaults_are_sane() {
        let cli = Cli::parse_from(["runa"]);
        assert_eq!(cli.max_iter, 10);
        assert_eq!(cli.qdrant, "http://localhost:6333");
        assert!(cli.wiki.is_none());
        assert!(cli.mcp.is_empty());
        assert!(!cli.index_only);
    }

    #[test]
    fn repeatable_mcp_flag_collects_in_order() {
        let cli = Cli::parse_from(["runa", "--mcp", "a", "--mcp", "b:c"]);
        assert_eq!(cli.mcp, vec!["a", "b:c"]);
    }
}
