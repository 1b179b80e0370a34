// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Message types, model-reply parsing, and chat backends.
//!
//! The reply parser is the heart of this crate: local models are driven
//! through a plain-text protocol where a tool call is a JSON object embedded
//! in free-form prose.  [`parse::parse_reply`] extracts that object with a
//! hand-written brace matcher and discards anything the model wrote after it.

pub mod backend;
pub mod mock;
pub mod openai_compat;
pub mod parse;
mod types;

pub use backend::ChatBackend;
pub use openai_compat::OpenAiChatBackend;
pub use types::{Message, ModelReply, Role, ToolInvocation};
