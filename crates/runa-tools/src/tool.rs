// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// Immutable description of a tool, produced once at registration and
/// rendered into the system prompt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// Trait every tool implements.
///
/// `invoke` receives the untyped argument object carried by the parsed tool
/// call and is responsible for validating and coercing it.  The returned
/// string is what the model sees verbatim.  An `Err` is rendered by the
/// agent as `Error: <message>` and fed back to the model; tool failures
/// are never fatal to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> Value;
    /// Execute the tool with the given arguments.
    async fn invoke(&self, args: &Value) -> anyhow::Result<String>;
    /// Release long-lived external resources (subprocesses, connections).
    /// Default is a no-op; resource-owning tools override this and the
    /// embedder must call it before discarding the tool.
    async fn release(&self) {}
}

impl dyn Tool {
    /// Snapshot this tool's registration-time descriptor.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct MinimalTool;

    #[async_trait]
    impl Tool for MinimalTool {
        fn name(&self) -> &str {
            "minimal"
        }
        fn description(&self) -> &str {
            "a minimal tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn invoke(&self, _args: &Value) -> anyhow::Result<String> {
            Ok("ok".into())
        }
    }

    #[test]
    fn descriptor_mirrors_the_tool() {
        let tool: Box<dyn Tool> = Box::new(MinimalTool);
        let d = tool.descriptor();
        assert_eq!(d.name, "minimal");
        assert_eq!(d.description, "a minimal tool");
        assert_eq!(d.parameters["type"], "object");
    }

    #[tokio::test]
    async fn default_release_is_a_no_op() {
        let tool: Box<dyn Tool> = Box::new(MinimalTool);
        tool.release().await;
    }

    #[test]
    fn descriptor_serialises_for_the_prompt() {
        let tool: Box<dyn Tool> = Box::new(MinimalTool);
        let json = serde_json::to_string_pretty(&tool.descriptor()).unwrap();
        assert!(json.contains("\"minimal\""));
        assert!(json.contains("\"parameters\""));
    }
}
