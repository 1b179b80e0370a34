// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System-prompt assembly.
//!
//! The prompt is the whole tool-calling contract: the model never sees a
//! provider tool schema, only this text plus the JSON-rendered catalog.

use runa_tools::ToolDescriptor;

const PREAMBLE: &str = "\
You are runa, an autonomous assistant that can observe and act on real \
systems through tools.

To call a tool, reply with exactly one JSON object and nothing else:
{\"name\": \"<tool name>\", \"parameters\": { ... }}

To give your final answer, reply in plain prose with no JSON object.";

const PROCESS: &str = "\
Process:
1. Prefer answering from your own knowledge when no real-world observation is needed.
2. Use a tool whenever the answer depends on the actual state of a system.
3. After a tool returns, synthesise its output into a final answer for the user.
4. If a tool fails, report the failure honestly. Never invent tool output.";

/// Assemble the system prompt for the given tool catalog.
pub fn system_prompt(descriptors: &[ToolDescriptor]) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\n");
    prompt.push_str(&routing_block(descriptors));
    prompt.push_str("\n\nAvailable tools:\n");
    prompt.push_str(
        &serde_json::to_string_pretty(descriptors).unwrap_or_else(|_| "[]".to_string()),
    );
    prompt.push_str("\n\n");
    prompt.push_str(PROCESS);
    prompt
}

/// The keyword → tool routing rules.  The MCP line is generated from the
/// registered MCP-family tool names so relabelled servers route correctly.
fn routing_block(descriptors: &[ToolDescriptor]) -> String {
    let mut block = String::from("Routing guidance:\n");
    let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();

    if names.contains(&"ssh") {
        block.push_str("- ssh, user@host, remote host or server -> 'ssh'\n");
    }
    if names.contains(&"shell") {
        block.push_str("- local command, check files or processes on this machine -> 'shell'\n");
    }
    let mcp_names: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| *n == "mcp" || n.starts_with("mcp_") || is_numbered_mcp(n))
        .collect();
    if !mcp_names.is_empty() {
        block.push_str(&format!(
            "- \"mcp\" or MCP tool calls -> {}\n",
            mcp_names
                .iter()
                .map(|n| format!("'{n}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if names.contains(&"wiki") {
        block.push_str("- wiki, confluence, documentation, diagram, architecture -> 'wiki'\n");
    }
    block.trim_end().to_string()
}

fn is_numbered_mcp(name: &str) -> bool {
    name.strip_prefix("mcp")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("the {name} tool"),
            parameters: json!({ "type": "object" }),
        }
    }

    #[test]
    fn prompt_declares_the_call_contract() {
        let p = system_prompt(&[descriptor("shell")]);
        assert!(p.contains("{\"name\": \"<tool name>\", \"parameters\": { ... }}"));
        assert!(p.contains("plain prose"));
    }

    #[test]
    fn prompt_embeds_the_catalog_as_pretty_json() {
        let p = system_prompt(&[descriptor("shell"), descriptor("wiki")]);
        assert!(p.contains("\"name\": \"shell\""));
        assert!(p.contains("\"name\": \"wiki\""));
        assert!(p.contains("\"parameters\""));
    }

    #[test]
    fn routing_lines_match_registered_tools() {
        let p = system_prompt(&[descriptor("shell"), descriptor("ssh")]);
        assert!(p.contains("remote host or server -> 'ssh'"));
        assert!(p.contains("-> 'shell'"));
        assert!(!p.contains("-> 'wiki'"));
    }

    #[test]
    fn mcp_line_is_generated_from_registered_names() {
        let p = system_prompt(&[
            descriptor("mcp_files"),
            descriptor("mcp2"),
            descriptor("shell"),
        ]);
        assert!(p.contains("'mcp_files', 'mcp2'"), "{p}");
    }

    #[test]
    fn no_mcp_line_without_mcp_tools() {
        let p = system_prompt(&[descriptor("shell")]);
        assert!(!p.contains("MCP tool calls"));
    }

    #[test]
    fn unrelated_mcp_prefix_is_not_picked_up() {
        // A hypothetical tool called "mcpx" is not part of the MCP family.
        let p = system_prompt(&[descriptor("mcpx")]);
        assert!(!p.contains("MCP tool calls"));
    }

    #[test]
    fn process_summary_closes_the_prompt() {
        let p = system_prompt(&[]);
        assert!(p.trim_end().ends_with("Never invent tool output."));
    }
}
