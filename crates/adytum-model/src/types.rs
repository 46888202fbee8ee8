// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// An assistant message carrying one requested tool invocation.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: id.into(),
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.to_string(),
                },
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
                is_error,
            },
        }
    }

    /// Plain text of this message, when it has text content.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }

    /// True for `tool`-role result messages.
    pub fn is_tool_result(&self) -> bool {
        matches!(self.content, MessageContent::ToolResult { .. })
    }

    /// True for assistant messages that request a tool invocation.
    pub fn is_tool_call(&self) -> bool {
        matches!(self.content, MessageContent::ToolCall { .. })
    }

    /// Conservative token estimate used for context management.
    ///
    /// Counts whitespace-separated words × 1.35, plus a flat per-message
    /// overhead for role/framing tokens.  Deliberately pessimistic so the
    /// compactor fires before the provider rejects the request.
    pub fn approx_tokens(&self) -> usize {
        const PER_MESSAGE_OVERHEAD: usize = 4;
        let text_len = |s: &str| (s.split_whitespace().count() as f64 * 1.35).ceil() as usize;
        let words = match &self.content {
            MessageContent::Text(t) => text_len(t),
            MessageContent::ToolCall { function, .. } => {
                text_len(&function.name) + text_len(&function.arguments)
            }
            MessageContent::ToolResult { content, .. } => text_len(content),
        };
        words + PER_MESSAGE_OVERHEAD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The content of a message.
///
/// - `Text` – plain string (most messages)
/// - `ToolCall` – the assistant requests a tool invocation
/// - `ToolResult` – the outcome of a tool call, tagged with the id it answers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        tool_call_id: String,
        function: FunctionCall,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

// ─── Adapter request/response types ──────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

/// Options forwarded with every chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// One tool invocation requested by the model, with parsed arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The assistant's reply in neutral form.
///
/// `content` is empty when the model only requested tools; `tool_calls` is
/// empty for a plain text answer.  Adapters always return `tool_calls` as a
/// flat array regardless of the provider's block nesting.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
}

impl AssistantReply {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other(String),
}

/// The full outcome of one provider chat call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub message: AssistantReply,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

impl ChatOutcome {
    /// Plain text reply with default usage, the common test fixture shape.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: AssistantReply {
                content: content.into(),
                tool_calls: vec![],
            },
            usage: Usage::new(10, 10),
            finish_reason: FinishReason::Stop,
        }
    }

    /// Tool-call-only reply.
    pub fn tool_calls(calls: Vec<ToolInvocation>) -> Self {
        Self {
            message: AssistantReply {
                content: String::new(),
                tool_calls: calls,
            },
            usage: Usage::new(10, 10),
            finish_reason: FinishReason::ToolCalls,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
