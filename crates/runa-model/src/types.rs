use serde::{Deserialize, Serialize};

/// A single message in the conversation.
///
/// Content is an opaque string for every role; tool results carry the name
/// of the tool that produced them so the backend can frame the text for the
/// model (`Tool '<name>' returned:` …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set only on `Role::Tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            tool_name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_name: None,
        }
    }

    /// A tool-result message.  `content` is the tool's observable output
    /// (or an `Error: …` rendering of its failure), verbatim.
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation extracted from model output.
///
/// `name` is never empty; `arguments` is always a JSON object once the
/// parser has normalised it (`{}` when the model sent none).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A fully assembled model reply.
///
/// When `tool_calls` is non-empty, `content` has been truncated at the
/// closing brace of the first recognised call; trailing text is discarded
/// so hallucinated "tool output" can never enter the conversation.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
    /// True when the reply is a final answer rather than a tool request.
    pub finished: bool,
}

impl ModelReply {
    /// The first tool call, if any.  Additional calls in the same reply are
    /// ignored by the agent loop.
    pub fn first_tool_call(&self) -> Option<&ToolInvocation> {
        self.tool_calls.first()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
