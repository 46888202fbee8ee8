// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_args, SecurityPolicy, Tool, ToolCall, ToolResult};

pub struct ReadFileTool {
    pub security: Arc<SecurityPolicy>,
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: PathBuf,
    /// 1-based line to start from.
    #[serde(default)]
    offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the workspace. Supports an optional \
         1-based line offset and a line limit for large files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to read" },
                "offset": { "type": "integer", "description": "1-based start line" },
                "limit": { "type": "integer", "description": "Maximum lines to return" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args: ReadFileArgs = match parse_args(call) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let path = match self.security.check(&args.path) {
            Ok(p) => p,
            Err(reason) => return ToolResult::err(&call.id, reason),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let start = args.offset.unwrap_or(1).saturating_sub(1);
                let out: String = match args.limit {
                    Some(limit) => text
                        .lines()
                        .skip(start)
                        .take(limit)
                        .collect::<Vec<_>>()
                        .join("\n"),
                    None if start > 0 => {
                        text.lines().skip(start).collect::<Vec<_>>().join("\n")
                    }
                    None => text,
                };
                ToolResult::ok(&call.id, out)
            }
            Err(e) => ToolResult::err(&call.id, format!("cannot read {}: {e}", path.display())),
        }
    }
}
