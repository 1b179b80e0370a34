// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::bail;
use tracing::{debug, warn};

use runa_model::{ChatBackend, Message};
use runa_tools::ToolRegistry;

use crate::events::{AgentEvent, EventFn};
use crate::prompts::system_prompt;
use crate::History;

/// How much of a tool result the operator sees.  The model always receives
/// the full text.
const DISPLAY_PREVIEW_CHARS: usize = 500;

/// The core agent: drives the model ↔ tool loop for one user at a time.
pub struct Agent {
    backend: Arc<dyn ChatBackend>,
    tools: ToolRegistry,
    system_prompt: String,
    history: History,
    max_iterations: u32,
    streaming: bool,
    on_event: Option<EventFn>,
}

impl Agent {
    /// Build an agent over a backend and a fully populated tool registry.
    /// The system prompt is rendered once from the registry's catalog.
    pub fn new(backend: Arc<dyn ChatBackend>, tools: ToolRegistry, max_iterations: u32) -> Self {
        let system_prompt = system_prompt(tools.descriptors());
        Self {
            backend,
            tools,
            system_prompt,
            history: History::new(),
            max_iterations,
            streaming: false,
            on_event: None,
        }
    }

    /// Stream prose replies chunk-by-chunk through the event callback
    /// instead of waiting for the full completion.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Register an observer for operator-visible progress events.
    pub fn with_events(mut self, on_event: EventFn) -> Self {
        self.on_event = Some(on_event);
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(f) = &self.on_event {
            f(&event);
        }
    }

    /// Run one user turn to completion.
    ///
    /// The user message is recorded in history immediately so a failed turn
    /// still shows what was asked.  A successful turn adds exactly one more
    /// message: the final assistant answer.
    pub async fn run(&mut self, user_input: &str) -> anyhow::Result<String> {
        let mut working: Vec<Message> = Vec::with_capacity(self.history.len() + 2);
        working.push(Message::system(&self.system_prompt));
        working.extend(self.history.messages().iter().cloned());
        working.push(Message::user(user_input));
        self.history.push(Message::user(user_input));

        for iteration in 0..self.max_iterations {
            debug!(iteration, "model round-trip");
            let reply = if self.streaming {
                let sink = |chunk: &str| self.emit(AgentEvent::TextChunk(chunk.to_string()));
                self.backend.chat_stream(&working, &sink).await?
            } else {
                self.backend.chat(&working).await?
            };

            if let Some(call) = reply.first_tool_call() {
                // Only the first call in a reply is honoured.
                let name = call.name.clone();
                self.emit(AgentEvent::ToolCallStarted { name: name.clone() });

                let (text, is_error) = match self.tools.invoke(&name, &call.arguments).await {
                    Ok(text) => (text, false),
                    Err(e) => {
                        warn!(tool = %name, "tool failed: {e}");
                        (format!("Error: {e}"), true)
                    }
                };
                self.emit(AgentEvent::ToolResult {
                    name: name.clone(),
                    preview: truncate_for_display(&text, DISPLAY_PREVIEW_CHARS),
                    is_error,
                });

                // The assistant message keeps its tool-call JSON (already
                // truncated at the closing brace by the parser); the full
                // tool result follows it.
                working.push(Message::assistant(&reply.content));
                working.push(Message::tool(&name, &text));
                continue;
            }

            if reply.finished || !reply.content.contains('{') {
                self.history.push(Message::assistant(&reply.content));
                return Ok(reply.content);
            }

            // Neither terminal nor a valid tool call: keep the text in the
            // working buffer and give the model another chance.  Degenerate
            // models can ride this branch all the way to the bound.
            working.push(Message::assistant(&reply.content));
        }

        bail!("max iterations ({}) reached", self.max_iterations)
    }
}

fn truncate_for_display(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}… ({} chars total)", s.chars().count())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_previews_pass_through() {
        assert_eq!(truncate_for_display("short", 500), "short");
    }

    #[test]
    fn long_previews_are_cut_with_a_total() {
        let long = "y".repeat(700);
        let preview = truncate_for_display(&long, 500);
        assert!(preview.contains("(700 chars total)"));
        assert!(preview.chars().count() < 540);
    }

    #[test]
    fn preview_truncation_is_multibyte_safe() {
        let long = "ö".repeat(700);
        let preview = truncate_for_display(&long, 500);
        assert!(preview.contains("700 chars total"));
    }
}
