// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{Message, ModelReply};

/// Callback receiving streamed prose chunks as they arrive from the model.
///
/// Never invoked for replies that the backend classifies as tool calls:
/// JSON must not leak into the operator's terminal.
pub type ChunkSink = dyn Fn(&str) + Send + Sync;

/// An opaque streaming chat endpoint.
///
/// Implementations adapt one concrete inference backend; the agent core
/// only ever sees assembled [`ModelReply`] values.  Backend failures are
/// surfaced as errors without retries.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier as reported to the operator.
    fn model_name(&self) -> &str;

    /// One-shot completion: blocks until the backend has produced the full
    /// reply, then parses it.
    async fn chat(&self, messages: &[Message]) -> anyhow::Result<ModelReply>;

    /// Streaming completion.  Prose replies are forwarded chunk-by-chunk
    /// through `on_chunk`; a reply whose first non-whitespace byte is `{`
    /// is buffered silently instead.  Either way the assembled text is
    /// parsed into the returned [`ModelReply`].
    async fn chat_stream(
        &self,
        messages: &[Message],
        on_chunk: &ChunkSink,
    ) -> anyhow::Result<ModelReply>;
}
