// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::debug;

use crate::{Tool, ToolDescriptor};

/// Central registry holding all registered tools.
///
/// Tools are few and long-lived, so a name-keyed map plus an ordered
/// descriptor list (registration order is what the system prompt shows)
/// is all the structure needed.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        debug!(tool = %descriptor.name, "registering tool");
        // Re-registering a name replaces the tool and its descriptor slot.
        if let Some(existing) = self
            .descriptors
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            *existing = descriptor;
        } else {
            self.descriptors.push(descriptor);
        }
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one invocation.  An unknown name is an error like any other
    /// tool failure: the agent renders it for the model and keeps going.
    pub async fn invoke(&self, name: &str, args: &Value) -> anyhow::Result<String> {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(args).await,
            None => Err(anyhow!("unknown tool: {name}")),
        }
    }

    /// Release every tool that owns external resources.  Called by the REPL
    /// harness before process exit.
    pub async fn release_all(&self) {
        for tool in self.tools.values() {
            tool.release().await;
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn invoke(&self, args: &Value) -> anyhow::Result<String> {
            Ok(format!("echo:{args}"))
        }
    }

    struct ReleasingTool {
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for ReleasingTool {
        fn name(&self) -> &str {
            "releasing"
        }
        fn description(&self) -> &str {
            "owns a resource"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn invoke(&self, _args: &Value) -> anyhow::Result<String> {
            Ok(String::new())
        }
        async fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool { name: "echo" }));
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn descriptors_preserve_registration_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool { name: "zeta" }));
        reg.register(Arc::new(EchoTool { name: "alpha" }));
        assert_eq!(reg.names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool { name: "a" }));
        reg.register(Arc::new(EchoTool { name: "b" }));
        reg.register(Arc::new(EchoTool { name: "a" }));
        assert_eq!(reg.names(), vec!["a", "b"]);
        assert_eq!(reg.descriptors().len(), 2);
    }

    #[tokio::test]
    async fn invoke_known_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool { name: "echo" }));
        let out = reg.invoke("echo", &json!({"x": 1})).await.unwrap();
        assert!(out.starts_with("echo:"));
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_an_error() {
        let reg = ToolRegistry::new();
        let err = reg.invoke("missing", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool: missing"));
    }

    #[tokio::test]
    async fn release_all_reaches_every_tool() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(ReleasingTool {
            released: released.clone(),
        }));
        reg.register(Arc::new(EchoTool { name: "echo" }));
        reg.release_all().await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
