// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Extraction of structured tool calls from free-form model output.
//!
//! Local models are asked (via the system prompt) to request a tool by
//! emitting a JSON object of the form `{"name": …, "parameters": …}`.  In
//! practice the object arrives surrounded by prose, reasoning, markdown
//! fences, and, worst of all, fabricated "tool output" written *after*
//! the JSON.  A streaming JSON decoder cannot handle the prose and a regex
//! cannot handle nested braces or string literals, so the object boundary
//! is found with a hand-written brace matcher that steps over strings and
//! escape sequences.  Everything after the closing brace is discarded so
//! that invented output can never masquerade as what a tool actually said.

use serde_json::Value;

use crate::{ModelReply, ToolInvocation};

/// Find the byte index of the `}` matching the first `{` in `s`.
///
/// String literals and escape sequences are honoured: a brace inside a JSON
/// string does not affect depth, and `\"` does not terminate a string.
/// Returns `-1` when `s` contains no `{` or the braces are unbalanced.
///
/// For any complete JSON object string this returns `s.len() - 1`.
pub fn find_matching_brace(s: &str) -> i64 {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut started = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                depth += 1;
                started = true;
            }
            '}' if !in_string => {
                depth -= 1;
                if started && depth == 0 {
                    return i as i64;
                }
            }
            _ => {}
        }
    }
    -1
}

/// Parse raw model output into a [`ModelReply`].
///
/// The first structurally valid JSON object that carries a `name` (or
/// `tool`) key becomes a [`ToolInvocation`]; the reply content is truncated
/// at its closing brace.  Replies without a recognisable call are terminal
/// when they contain a `final answer:` / `answer:` marker or no `{` at all.
pub fn parse_reply(content: &str) -> ModelReply {
    let start = match content.find('{') {
        Some(i) => i,
        None => {
            return ModelReply {
                content: content.to_string(),
                tool_calls: Vec::new(),
                finished: true,
            };
        }
    };

    if let Some(call) = extract_tool_call(&content[start..]) {
        let (invocation, rel_end) = call;
        // Truncate at the closing brace of the recognised object: anything
        // the model wrote after it is hallucinated tool output.
        let end = start + rel_end + 1;
        return ModelReply {
            content: content[..end].to_string(),
            tool_calls: vec![invocation],
            finished: false,
        };
    }

    ModelReply {
        content: content.to_string(),
        tool_calls: Vec::new(),
        finished: contains_final_marker(content),
    }
}

/// Try to decode the object starting at `s[0] == '{'` as a tool call.
/// Returns the invocation and the byte index of the matching `}` within `s`.
fn extract_tool_call(s: &str) -> Option<(ToolInvocation, usize)> {
    let end = find_matching_brace(s);
    if end < 0 {
        return None;
    }
    let end = end as usize;

    let obj: Value = serde_json::from_str(&s[..=end]).ok()?;
    let map = obj.as_object()?;

    // Either spelling is accepted; the first non-empty one wins.
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .or_else(|| {
            map.get("tool")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
        })?
        .to_string();

    let arguments = map
        .get("parameters")
        .filter(|v| !v.is_null())
        .or_else(|| map.get("params").filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    Some((ToolInvocation { name, arguments }, end))
}

/// Case-insensitive scan for the markers a model uses to announce a final
/// prose answer.
fn contains_final_marker(content: &str) -> bool {
    let lower = content.to_lowercase();
    lower.contains("final answer:") || lower.contains("answer:")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
