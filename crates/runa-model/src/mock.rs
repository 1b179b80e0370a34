// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic scripted backend for tests.
//!
//! Each call to `chat` / `chat_stream` pops the next scripted reply, runs it
//! through the real reply parser, and records the message list it was given
//! so tests can inspect exactly what the agent sent.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::ChunkSink;
use crate::openai_compat::StreamAssembler;
use crate::parse::parse_reply;
use crate::{ChatBackend, Message, ModelReply};

/// A pre-scripted chat backend.  Replies are consumed front-to-back; when
/// the script runs dry the last reply is repeated (convenient for
/// iteration-bound tests where the model "always" answers the same way).
pub struct ScriptedBackend {
    replies: Mutex<Vec<String>>,
    /// Every message list this backend has been called with, in order.
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn next_reply(&self, messages: &[Message]) -> String {
        self.calls.lock().unwrap().push(messages.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies.first().cloned().unwrap_or_default()
        }
    }

    /// Number of completed backend calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of the message lists seen so far.
    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    async fn chat(&self, messages: &[Message]) -> anyhow::Result<ModelReply> {
        Ok(parse_reply(&self.next_reply(messages)))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        on_chunk: &ChunkSink,
    ) -> anyhow::Result<ModelReply> {
        // Replay the scripted reply through the same assembler the real
        // backend uses so streaming discrimination is exercised in tests.
        let reply = self.next_reply(messages);
        let mut asm = StreamAssembler::new();
        for chunk in chunk_up(&reply) {
            asm.push(chunk, on_chunk);
        }
        Ok(parse_reply(asm.text()))
    }
}

/// Split a reply into small chunks so streamed delivery is realistic.
fn chunk_up(s: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in s.char_indices() {
        if count == 4 {
            chunks.push(&s[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < s.len() {
        chunks.push(&s[start..]);
    }
    chunks
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
