// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Operator-visible progress events emitted while a turn runs.
///
/// The REPL renders these; tests collect them.  Tool results are previewed
/// truncated; the model always receives the full text.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A streamed chunk of the model's prose reply.
    TextChunk(String),
    ToolCallStarted {
        name: String,
    },
    ToolResult {
        name: String,
        /// Result text truncated for display.
        preview: String,
        is_error: bool,
    },
}

/// Callback the embedder registers to observe events.
pub type EventFn = Box<dyn Fn(&AgentEvent) + Send + Sync>;
