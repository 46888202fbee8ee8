// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_args, Tool, ToolCall, ToolResult};

const MAX_BODY_BYTES: usize = 128 * 1024;

pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct HttpFetchArgs {
    url: String,
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP GET and return the response body as text. \
         Bodies above 128 KiB are truncated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http(s) URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args: HttpFetchArgs = match parse_args(call) {
            Ok(a) => a,
            Err(e) => return e,
        };
        if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
            return ToolResult::err(&call.id, format!("unsupported URL scheme: {}", args.url));
        }
        let resp = match self.client.get(&args.url).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(&call.id, format!("fetch failed: {e}")),
        };
        let status = resp.status();
        let mut body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(&call.id, format!("cannot read body: {e}")),
        };
        if body.len() > MAX_BODY_BYTES {
            let omitted = body.len() - MAX_BODY_BYTES;
            body.truncate(MAX_BODY_BYTES);
            body.push_str(&format!("\n[... {omitted} bytes omitted ...]"));
        }
        if status.is_success() {
            ToolResult::ok(&call.id, body)
        } else {
            ToolResult::err(&call.id, format!("HTTP {status}: {body}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_http_scheme_rejected() {
        let t = HttpFetchTool::new();
        let out = t
            .execute(&ToolCall::new(
                "c",
                "http_fetch",
                json!({"url": "file:///etc/passwd"}),
            ))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("unsupported URL scheme"));
    }

    #[tokio::test]
    async fn missing_url_is_validation_error() {
        let t = HttpFetchTool::new();
        let out = t
            .execute(&ToolCall::new("c", "http_fetch", json!({})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid arguments"));
    }
}
