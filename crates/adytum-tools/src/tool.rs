// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
    /// Session that issued the call; filled by the runtime before dispatch.
    /// Tools that spawn sub-agents use it as the parent edge.
    pub session_id: Option<String>,
    /// Trace envelope of the issuing turn.
    pub trace_id: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            session_id: None,
            trace_id: None,
        }
    }

    pub fn with_context(
        mut self,
        session_id: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        self.session_id = Some(session_id.into());
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// The result of executing a tool.
///
/// `is_error` marks a non-fatal failure: the text goes back to the model as
/// a tool message and the turn continues.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Trait that every built-in and skill-registered tool implements.
///
/// Each tool owns a typed argument struct; `execute` starts by deserialising
/// `call.args` into it and reports a validation failure as an error result
/// rather than panicking.  Nothing a tool does may abort the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object
    fn parameters_schema(&self) -> Value;
    /// Tools returning `true` are gated by the runtime's approval handler
    /// before `execute` is ever invoked.
    fn requires_approval(&self) -> bool {
        false
    }
    async fn execute(&self, call: &ToolCall) -> ToolResult;
}

/// Deserialise tool arguments, mapping serde failures to the uniform
/// validation-error result shape.
pub fn parse_args<T: serde::de::DeserializeOwned>(call: &ToolCall) -> Result<T, ToolResult> {
    serde_json::from_value(call.args.clone())
        .map_err(|e| ToolResult::err(&call.id, format!("invalid arguments: {e}")))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
