// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Messages-API adapter for the Anthropic wire format.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    AssistantReply, ChatOptions, ChatOutcome, FinishReason, Message, MessageContent,
    ProviderAdapter, ProviderError, ResolvedAuth, Role, ToolInvocation, Usage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    base_url: String,
    auth: ResolvedAuth,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>, auth: ResolvedAuth, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn family(&self) -> &str {
        "anthropic"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = build_request_body(model, messages, opts);
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.auth.secret)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(ProviderError::from_status(status, &text));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Transport(format!("malformed response: {e}")))?;
        parse_response(&value)
    }
}

/// Serialise the neutral messages into the Anthropic block shape.
///
/// System messages are lifted into the top-level `system` field.  Assistant
/// text and tool_use blocks merge into one assistant wire message when
/// adjacent; tool results become `tool_result` blocks inside a user message.
/// Empty text blocks are dropped (the API rejects them).
pub(crate) fn build_request_body(model: &str, messages: &[Message], opts: &ChatOptions) -> Value {
    let system: String = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .filter_map(|m| m.as_text())
        .collect::<Vec<_>>()
        .join("\n\n");

    // (wire_role, blocks) accumulator; adjacent same-role entries merge.
    let mut wire: Vec<(String, Vec<Value>)> = Vec::new();
    fn push_block(role: &str, block: Value, wire: &mut Vec<(String, Vec<Value>)>) {
        match wire.last_mut() {
            Some((last_role, blocks)) if last_role == role => blocks.push(block),
            _ => wire.push((role.to_string(), vec![block])),
        }
    }

    for m in messages {
        match (&m.role, &m.content) {
            (Role::System, _) => {}
            (_, MessageContent::Text(text)) => {
                if text.is_empty() {
                    continue;
                }
                let role = if m.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                };
                push_block(role, json!({"type": "text", "text": text}), &mut wire);
            }
            (
                _,
                MessageContent::ToolCall {
                    tool_call_id,
                    function,
                },
            ) => {
                let input: Value =
                    serde_json::from_str(&function.arguments).unwrap_or_else(|_| json!({}));
                push_block(
                    "assistant",
                    json!({
                        "type": "tool_use",
                        "id": tool_call_id,
                        "name": function.name,
                        "input": input,
                    }),
                    &mut wire,
                );
            }
            (
                _,
                MessageContent::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                },
            ) => {
                push_block(
                    "user",
                    json!({
                        "type": "tool_result",
                        "tool_use_id": tool_call_id,
                        "content": content,
                        "is_error": is_error,
                    }),
                    &mut wire,
                );
            }
        }
    }

    let wire_messages: Vec<Value> = wire
        .into_iter()
        .map(|(role, blocks)| json!({"role": role, "content": blocks}))
        .collect();

    let mut body = json!({
        "model": model,
        "max_tokens": opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": wire_messages,
    });
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if !opts.tools.is_empty() {
        body["tools"] = Value::Array(
            opts.tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        );
    }
    if let Some(t) = opts.temperature {
        body["temperature"] = json!(t);
    }
    body
}

/// Parse a messages-API response, flattening content blocks into the neutral
/// reply: text blocks concatenate, tool_use blocks become the flat
/// `tool_calls` array.
pub(crate) fn parse_response(value: &Value) -> Result<ChatOutcome, ProviderError> {
    let blocks = value["content"]
        .as_array()
        .ok_or_else(|| ProviderError::Transport("response has no content".into()))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for b in blocks {
        match b["type"].as_str() {
            Some("text") => content.push_str(b["text"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(ToolInvocation {
                id: b["id"].as_str().unwrap_or_default().to_string(),
                name: b["name"].as_str().unwrap_or_default().to_string(),
                arguments: b["input"].clone(),
            }),
            _ => {}
        }
    }

    let finish_reason = match value["stop_reason"].as_str() {
        Some("end_turn") => FinishReason::Stop,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("max_tokens") => FinishReason::Length,
        Some(other) => FinishReason::Other(other.to_string()),
        None => FinishReason::Stop,
    };

    let prompt = value["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
    let completion = value["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

    Ok(ChatOutcome {
        message: AssistantReply {
            content,
            tool_calls,
        },
        usage: Usage::new(prompt, completion),
        finish_reason,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
