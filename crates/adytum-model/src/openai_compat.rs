// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Chat-completions adapter for the OpenAI-compatible wire format.
//!
//! One adapter serves every family that speaks this shape: openai, groq,
//! openrouter, mistral, deepseek, and the local servers (ollama, lmstudio,
//! vllm).  The only differences are `base_url` and auth style.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    AssistantReply, AuthMode, ChatOptions, ChatOutcome, FinishReason, Message, MessageContent,
    ProviderAdapter, ProviderError, ResolvedAuth, ToolInvocation, Usage,
};

pub struct OpenAiCompatAdapter {
    base_url: String,
    auth: ResolvedAuth,
    client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    pub fn new(base_url: impl Into<String>, auth: ResolvedAuth, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn family(&self) -> &str {
        "openai"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = build_request_body(model, messages, opts);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut req = self.client.post(&url).json(&body);
        req = match self.auth.mode {
            AuthMode::Bearer | AuthMode::ApiKey => req.bearer_auth(&self.auth.secret),
            AuthMode::None => req,
        };

        let resp = req.send().await?;
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

/// Serialise the neutral message list into the chat-completions shape.
///
/// Consecutive assistant tool-call messages collapse into one assistant wire
/// message with a `tool_calls` array; null/empty assistant content is
/// omitted entirely (several gateways reject `content: null`).
pub(crate) fn build_request_body(model: &str, messages: &[Message], opts: &ChatOptions) -> Value {
    let mut wire: Vec<Value> = Vec::with_capacity(messages.len());
    let mut pending_calls: Vec<Value> = Vec::new();

    let flush_calls = |wire: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            wire.push(json!({
                "role": "assistant",
                "tool_calls": std::mem::take(pending),
            }));
        }
    };

    for m in messages {
        match &m.content {
            MessageContent::ToolCall {
                tool_call_id,
                function,
            } => {
                pending_calls.push(json!({
                    "id": tool_call_id,
                    "type": "function",
                    "function": {
                        "name": function.name,
                        "arguments": function.arguments,
                    }
                }));
            }
            MessageContent::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                flush_calls(&mut wire, &mut pending_calls);
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                }));
            }
            MessageContent::Text(text) => {
                flush_calls(&mut wire, &mut pending_calls);
                let role = match m.role {
                    crate::Role::System => "system",
                    crate::Role::User => "user",
                    crate::Role::Assistant => "assistant",
                    crate::Role::Tool => "tool",
                };
                if m.role == crate::Role::Assistant && text.is_empty() {
                    continue;
                }
                wire.push(json!({ "role": role, "content": text }));
            }
        }
    }
    flush_calls(&mut wire, &mut pending_calls);

    let mut body = json!({ "model": model, "messages": wire });
    if !opts.tools.is_empty() {
        body["tools"] = Value::Array(
            opts.tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        );
    }
    if let Some(t) = opts.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(mt) = opts.max_tokens {
        body["max_tokens"] = json!(mt);
    }
    body
}

/// Parse a chat-completions response into the neutral outcome.
pub(crate) fn parse_response(value: &Value) -> Result<ChatOutcome, ProviderError> {
    let choice = value["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::Transport("response has no choices".into()))?;
    let msg = &choice["message"];

    let content = msg["content"].as_str().unwrap_or_default().to_string();
    let tool_calls: Vec<ToolInvocation> = msg["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|c| {
                    let args_raw = c["function"]["arguments"].as_str().unwrap_or("{}");
                    ToolInvocation {
                        id: c["id"].as_str().unwrap_or_default().to_string(),
                        name: c["function"]["name"].as_str().unwrap_or_default().to_string(),
                        // Invalid argument JSON degrades to {}: the tool
                        // registry reports the validation failure back to
                        // the model instead of the turn aborting here.
                        arguments: serde_json::from_str(args_raw)
                            .unwrap_or_else(|_| json!({})),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = match choice["finish_reason"].as_str() {
        Some("stop") => FinishReason::Stop,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some(other) => FinishReason::Other(other.to_string()),
        None => FinishReason::Stop,
    };

    let usage = Usage {
        prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: value["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(ChatOutcome {
        message: AssistantReply {
            content,
            tool_calls,
        },
        usage,
        finish_reason,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolSchema;

    #[test]
    fn consecutive_tool_calls_collapse_into_one_assistant_message() {
        let messages = vec![
            Message::user("do two things"),
            Message::tool_call("c1", "read_file", json!({"path": "a"})),
            Message::tool_call("c2", "read_file", json!({"path": "b"})),
            Message::tool_result("c1", "A", false),
            Message::tool_result("c2", "B", false),
        ];
        let body = build_request_body("m", &messages, &ChatOptions::default());
        let wire = body["messages"].as_array().unwrap();
        // user + 1 assistant(tool_calls×2) + 2 tool results
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[1]["role"], "assistant");
        assert_eq!(wire[1]["tool_calls"].as_array().unwrap().len(), 2);
        assert!(wire[1].get("content").is_none(), "null content must be stripped");
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "c1");
    }

    #[test]
    fn empty_assistant_text_is_omitted() {
        let messages = vec![Message::user("hi"), Message::assistant("")];
        let body = build_request_body("m", &messages, &ChatOptions::default());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn tools_serialised_as_function_schemas() {
        let opts = ChatOptions {
            tools: vec![ToolSchema {
                name: "web_search".into(),
                description: "search".into(),
                parameters: json!({"type": "object"}),
            }],
            ..Default::default()
        };
        let body = build_request_body("m", &[Message::user("q")], &opts);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
    }

    #[test]
    fn parse_text_reply() {
        let v = json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
        });
        let out = parse_response(&v).unwrap();
        assert_eq!(out.message.content, "hello");
        assert!(out.message.tool_calls.is_empty());
        assert_eq!(out.usage.total_tokens, 10);
        assert_eq!(out.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn parse_tool_call_reply_flattens_array() {
        let v = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"weather\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        });
        let out = parse_response(&v).unwrap();
        assert_eq!(out.message.tool_calls.len(), 1);
        let call = &out.message.tool_calls[0];
        assert_eq!(call.id, "c1");
        assert_eq!(call.name, "web_search");
        assert_eq!(call.arguments["query"], "weather");
        assert_eq!(out.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn parse_invalid_call_arguments_degrade_to_empty_object() {
        let v = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "c1",
                        "function": {"name": "t", "arguments": "{not json"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {}
        });
        let out = parse_response(&v).unwrap();
        assert_eq!(out.message.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn parse_missing_choices_is_transport_error() {
        let v = json!({"error": "nope"});
        assert!(matches!(
            parse_response(&v),
            Err(ProviderError::Transport(_))
        ));
    }
}
