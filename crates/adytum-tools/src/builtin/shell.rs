// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::{parse_args, PolicyDecision, ShellPolicy, Tool, ToolCall, ToolResult};

const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub struct ShellExecuteTool {
    pub timeout_secs: u64,
    pub policy: Arc<ShellPolicy>,
}

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
}

#[async_trait]
impl Tool for ShellExecuteTool {
    fn name(&self) -> &str {
        "shell_execute"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace and return stdout + stderr. \
         Long output is truncated; the command is killed on timeout."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Command line passed to sh -c" }
            },
            "required": ["command"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args: ShellArgs = match parse_args(call) {
            Ok(a) => a,
            Err(e) => return e,
        };

        // Deny patterns are enforced here unconditionally; the approval
        // handler can only gate, not override a hard deny.
        if self.policy.decide(&args.command) == PolicyDecision::Deny {
            return ToolResult::err(
                &call.id,
                format!("command denied by policy: {}", args.command),
            );
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(&args.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(self.timeout_secs), child).await
        {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolResult::err(&call.id, format!("cannot spawn shell: {e}")),
            Err(_) => {
                return ToolResult::err(
                    &call.id,
                    format!("command timed out after {}s", self.timeout_secs),
                )
            }
        };

        let mut text = String::new();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        if !output.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        if text.len() > MAX_OUTPUT_BYTES {
            let omitted = text.len() - MAX_OUTPUT_BYTES;
            text.truncate(MAX_OUTPUT_BYTES);
            text.push_str(&format!("\n[... {omitted} bytes omitted ...]"));
        }

        if output.status.success() {
            ToolResult::ok(&call.id, text)
        } else {
            ToolResult::err(
                &call.id,
                format!("exit status {}: {text}", output.status.code().unwrap_or(-1)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use adytum_config::ToolsConfig;

    use super::*;

    fn tool() -> ShellExecuteTool {
        ShellExecuteTool {
            timeout_secs: 5,
            policy: Arc::new(ShellPolicy::from_config(&ToolsConfig::default())),
        }
    }

    fn call(cmd: &str) -> ToolCall {
        ToolCall::new("c", "shell_execute", json!({"command": cmd}))
    }

    #[test]
    fn shell_requires_approval() {
        assert!(tool().requires_approval());
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = tool().execute(&call("echo hello")).await;
        assert!(!out.is_error);
        assert_eq!(out.content.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_result() {
        let out = tool().execute(&call("exit 3")).await;
        assert!(out.is_error);
        assert!(out.content.contains("exit status 3"));
    }

    #[tokio::test]
    async fn deny_pattern_blocks_execution() {
        let out = tool().execute(&call("rm -rf /*")).await;
        assert!(out.is_error);
        assert!(out.content.contains("denied by policy"));
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let t = ShellExecuteTool {
            timeout_secs: 1,
            policy: Arc::new(ShellPolicy::from_config(&ToolsConfig::default())),
        };
        let out = t.execute(&call("sleep 10")).await;
        assert!(out.is_error);
        assert!(out.content.contains("timed out"));
    }
}
