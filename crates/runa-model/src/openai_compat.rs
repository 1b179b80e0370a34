// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Chat backend for OpenAI-compatible `/chat/completions` servers.
//!
//! Local inference servers (Ollama, llama.cpp, LM Studio, vLLM) all speak
//! the same wire format, so one adapter covers them.  Tool calls are *not*
//! negotiated through the provider tool-call protocol; the agent drives a
//! plain-text protocol where the model embeds a JSON object in its reply.
//! That keeps the adapter down to role mapping plus SSE plumbing.

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::ChunkSink;
use crate::parse::parse_reply;
use crate::{ChatBackend, Message, ModelReply, Role};

pub struct OpenAiChatBackend {
    model: String,
    chat_url: String,
    client: reqwest::Client,
}

impl OpenAiChatBackend {
    /// `base_url` ends before `/chat/completions`, e.g.
    /// `http://localhost:11434/v1`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model: model.into(),
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, messages: &[Message], stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": build_wire_messages(messages),
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message]) -> anyhow::Result<ModelReply> {
        debug!(model = %self.model, message_count = messages.len(), "sending completion request");
        let resp = self
            .client
            .post(&self.chat_url)
            .json(&self.request_body(messages, false))
            .send()
            .await
            .context("chat request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("chat backend error {status}: {text}");
        }

        let body: Value = resp.json().await.context("invalid chat response body")?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(parse_reply(&content))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        on_chunk: &ChunkSink,
    ) -> anyhow::Result<ModelReply> {
        debug!(model = %self.model, message_count = messages.len(), "sending streaming request");
        let resp = self
            .client
            .post(&self.chat_url)
            .json(&self.request_body(messages, true))
            .send()
            .await
            .context("chat request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("chat backend error {status}: {text}");
        }

        let mut assembler = StreamAssembler::new();
        let mut byte_stream = resp.bytes_stream();
        // SSE events can be split across TCP packets; keep a line buffer
        // across chunks and only parse complete `\n`-terminated lines.
        let mut line_buf = String::new();
        'outer: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.context("chat stream interrupted")?;
            line_buf.push_str(&String::from_utf8_lossy(&chunk));
            for delta in drain_complete_sse_lines(&mut line_buf) {
                match delta {
                    SseEvent::Delta(text) => assembler.push(&text, on_chunk),
                    SseEvent::Done => break 'outer,
                }
            }
        }

        Ok(parse_reply(assembler.text()))
    }
}

/// One parsed server-sent event from the completion stream.
enum SseEvent {
    Delta(String),
    Done,
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, leaving any
/// trailing partial line in place for the next TCP chunk.
fn drain_complete_sse_lines(buf: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Some(nl) = buf.find('\n') {
        let line = buf[..nl].trim_end_matches('\r').to_string();
        *buf = buf[nl + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

fn parse_sse_data_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let v: Value = serde_json::from_str(data).ok()?;
    let text = v["choices"][0]["delta"]["content"].as_str()?;
    if text.is_empty() {
        return None;
    }
    Some(SseEvent::Delta(text.to_string()))
}

/// Accumulates streamed deltas and decides, at the first non-whitespace
/// byte, whether the reply is a tool call (buffer silently) or prose
/// (forward everything through the sink).
///
/// Once `streaming_started` latches on it is never reset: a reply cannot
/// switch from prose back to silent buffering mid-stream.
pub(crate) struct StreamAssembler {
    full: String,
    decided: bool,
    streaming_started: bool,
}

impl StreamAssembler {
    pub(crate) fn new() -> Self {
        Self {
            full: String::new(),
            decided: false,
            streaming_started: false,
        }
    }

    pub(crate) fn push(&mut self, delta: &str, on_chunk: &ChunkSink) {
        self.full.push_str(delta);
        if !self.decided {
            let trimmed = self.full.trim_start();
            if trimmed.is_empty() {
                return;
            }
            self.decided = true;
            if !trimmed.starts_with('{') {
                self.streaming_started = true;
                // Flush the prefix held back while deciding.
                on_chunk(&self.full);
            }
            return;
        }
        if self.streaming_started {
            on_chunk(delta);
        }
    }

    pub(crate) fn text(&self) -> &str {
        &self.full
    }
}

/// Map messages onto the OpenAI wire format.
///
/// Tool results become a human-visible `Tool '<name>' returned:` block.
/// The model never sees a structured tool-result payload because the whole
/// tool protocol rides on plain text.
pub(crate) fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::Tool => {
                let name = m.tool_name.as_deref().unwrap_or("tool");
                json!({
                    "role": "tool",
                    "content": format!("Tool '{name}' returned:\n{}", m.content),
                })
            }
            _ => json!({ "role": role_str(m.role), "content": m.content }),
        })
        .collect()
}

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
