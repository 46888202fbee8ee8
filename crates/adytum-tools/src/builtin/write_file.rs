// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_args, SecurityPolicy, Tool, ToolCall, ToolResult};

pub struct WriteFileTool {
    pub security: Arc<SecurityPolicy>,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: PathBuf,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a UTF-8 text file, creating parent directories as needed. \
         Overwrites any existing content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Destination path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args: WriteFileArgs = match parse_args(call) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let path = match self.security.check(&args.path) {
            Ok(p) => p,
            Err(reason) => return ToolResult::err(&call.id, reason),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(&call.id, format!("cannot create {}: {e}", parent.display()));
            }
        }
        match tokio::fs::write(&path, &args.content).await {
            Ok(()) => ToolResult::ok(
                &call.id,
                format!("wrote {} bytes to {}", args.content.len(), path.display()),
            ),
            Err(e) => ToolResult::err(&call.id, format!("cannot write {}: {e}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_file_requires_approval() {
        let t = WriteFileTool {
            security: Arc::new(SecurityPolicy::permissive()),
        };
        assert!(t.requires_approval());
    }

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/out.txt");
        let t = WriteFileTool {
            security: Arc::new(SecurityPolicy::permissive()),
        };
        let out = t
            .execute(&ToolCall::new(
                "c1",
                "write_file",
                json!({"path": path.to_str().unwrap(), "content": "hello"}),
            ))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn denied_outside_whitelist() {
        let t = WriteFileTool {
            security: Arc::new(SecurityPolicy::with_roots(vec!["/workspace".into()])),
        };
        let out = t
            .execute(&ToolCall::new(
                "c1",
                "write_file",
                json!({"path": "/etc/evil", "content": "x"}),
            ))
            .await;
        assert!(out.is_error);
        assert!(out.content.starts_with("access denied"));
    }
}
