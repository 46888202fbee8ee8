// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_args, SecurityPolicy, Tool, ToolCall, ToolResult};

pub struct ListDirTool {
    pub security: Arc<SecurityPolicy>,
}

#[derive(Deserialize)]
struct ListDirArgs {
    path: PathBuf,
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are suffixed with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args: ListDirArgs = match parse_args(call) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let path = match self.security.check(&args.path) {
            Ok(p) => p,
            Err(reason) => return ToolResult::err(&call.id, reason),
        };
        let mut rd = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => {
                return ToolResult::err(&call.id, format!("cannot list {}: {e}", path.display()))
            }
        };
        let mut entries: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        ToolResult::ok(&call.id, entries.join("\n"))
    }
}
