// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    ChatOptions, ChatOutcome, Message, ProviderAdapter, ProviderError, Role, ToolInvocation,
};

/// Deterministic mock adapter for tests.  Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockAdapter;

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn family(&self) -> &str {
        "mock"
    }

    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]");
        Ok(ChatOutcome::text(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted adapter.  Each `chat` call pops the next outcome from the
/// front of the queue, so tests can specify exact sequences, including
/// tool calls and classified failures, without network access.
pub struct ScriptedMockAdapter {
    scripts: Mutex<VecDeque<Result<ChatOutcome, ProviderError>>>,
    /// Error returned once the queue is exhausted; `None` yields a marker
    /// text reply instead.
    fallback_error: Mutex<Option<ProviderError>>,
    /// Model ids seen by `chat`, in call order.
    pub calls: Arc<Mutex<Vec<String>>>,
    /// The message list from the most recent `chat` call.
    pub last_messages: Arc<Mutex<Vec<Message>>>,
}

impl ScriptedMockAdapter {
    pub fn new(scripts: Vec<Result<ChatOutcome, ProviderError>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback_error: Mutex::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
            last_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adapter that always answers with the same text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Ok(ChatOutcome::text(reply.into()))])
    }

    /// Adapter that first requests one tool call, then answers with text.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Ok(ChatOutcome::tool_calls(vec![ToolInvocation {
                id: tool_id.into(),
                name: tool_name.into(),
                arguments: args,
            }])),
            Ok(ChatOutcome::text(final_text)),
        ])
    }

    /// Adapter whose every call fails with the given error.
    pub fn always_err(err: ProviderError) -> Self {
        let s = Self::new(vec![]);
        *s.fallback_error.lock().unwrap() = Some(err);
        s
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for ScriptedMockAdapter {
    fn default() -> Self {
        Self::new(vec![])
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedMockAdapter {
    fn family(&self) -> &str {
        "mock"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        _opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        self.calls.lock().unwrap().push(model.to_string());
        *self.last_messages.lock().unwrap() = messages.to_vec();
        if let Some(next) = self.scripts.lock().unwrap().pop_front() {
            return next;
        }
        if let Some(err) = self.fallback_error.lock().unwrap().clone() {
            return Err(err);
        }
        // Scripts exhausted: return an explicit marker so the failure mode
        // shows up in assertions rather than a hang.
        Ok(ChatOutcome::text("[no more scripts]"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let a = MockAdapter;
        let out = a
            .chat("m", &[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(out.message.content, "MOCK: hi");
    }

    #[tokio::test]
    async fn scripted_pops_in_order() {
        let a = ScriptedMockAdapter::new(vec![
            Ok(ChatOutcome::text("first")),
            Ok(ChatOutcome::text("second")),
        ]);
        let req = [Message::user("x")];
        let o1 = a.chat("m", &req, &ChatOptions::default()).await.unwrap();
        let o2 = a.chat("m", &req, &ChatOptions::default()).await.unwrap();
        assert_eq!(o1.message.content, "first");
        assert_eq!(o2.message.content, "second");
        assert_eq!(a.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_tool_then_text() {
        let a = ScriptedMockAdapter::tool_then_text(
            "c1",
            "web_search",
            serde_json::json!({"query": "weather"}),
            "It's sunny.",
        );
        let req = [Message::user("weather?")];
        let o1 = a.chat("m", &req, &ChatOptions::default()).await.unwrap();
        assert!(o1.message.has_tool_calls());
        let o2 = a.chat("m", &req, &ChatOptions::default()).await.unwrap();
        assert_eq!(o2.message.content, "It's sunny.");
    }

    #[tokio::test]
    async fn always_err_keeps_failing() {
        let a = ScriptedMockAdapter::always_err(ProviderError::Transport("down".into()));
        let req = [Message::user("x")];
        for _ in 0..3 {
            assert!(a.chat("m", &req, &ChatOptions::default()).await.is_err());
        }
    }

    #[tokio::test]
    async fn exhausted_scripts_return_marker() {
        let a = ScriptedMockAdapter::new(vec![]);
        let out = a
            .chat("m", &[Message::user("x")], &ChatOptions::default())
            .await
            .unwrap();
        assert!(out.message.content.contains("no more scripts"));
    }

    #[tokio::test]
    async fn last_messages_records_request() {
        let a = ScriptedMockAdapter::always_text("ok");
        a.chat("m", &[Message::user("q1")], &ChatOptions::default())
            .await
            .unwrap();
        let seen = a.last_messages.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_text(), Some("q1"));
    }
}
