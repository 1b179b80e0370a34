// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::Tool;

/// Built-in tool that runs a command on the local host under `sh -c`.
pub struct ShellTool {
    pub timeout_secs: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl ShellTool {
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command on the local machine and return its output. \
         Use this to inspect files, check processes, query the system, or run \
         any non-interactive command. The 'command' parameter is required."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, args: &Value) -> anyhow::Result<String> {
        let command = match args.get("command").and_then(Value::as_str) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => bail!("command parameter required"),
        };

        debug!(cmd = %command, "executing shell command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command);
        // No terminal access for the child: most interactive programs check
        // isatty(0) first and fall back to non-interactive behaviour.
        cmd.stdin(Stdio::null());
        // When the timeout fires and the future is dropped, the child is
        // killed instead of lingering as an orphan.
        cmd.kill_on_drop(true);

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), cmd.output())
                .await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok(render_output(&stdout, &stderr, output.status.code()))
            }
            Ok(Err(e)) => bail!("failed to run command: {e}"),
            Err(_) => Ok(format!(
                "Command timed out after {} seconds.\nError: command timed out",
                self.timeout_secs
            )),
        }
    }
}

/// Assemble the observable output text for a completed child process.
///
/// A non-zero exit is part of the observable result, not a tool failure:
/// the condition is spelled out in the text so the model can react to it.
pub(crate) fn render_output(stdout: &str, stderr: &str, status: Option<i32>) -> String {
    let mut out = String::new();
    out.push_str(stdout);
    if !stderr.is_empty() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("STDERR:\n");
        out.push_str(stderr);
    }

    let code = status.unwrap_or(-1);
    if code == 0 {
        if out.trim().is_empty() {
            return "(command succeeded but produced no output)".to_string();
        }
        return out;
    }

    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!(
        "Command exited with status: {code}\n\
         (note: for grep, exit status 1 just means no matches were found — that is not an error)"
    ));
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
