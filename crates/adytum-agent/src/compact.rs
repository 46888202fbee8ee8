// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Prompt assembly for safe-cut compaction.
//!
//! The runtime picks the cut point via `ContextManager::safe_cut_index`,
//! sends the prefix through a fast-role model call with the prompt built
//! here, and replaces the prefix with a single summary system message.

use adytum_model::{Message, MessageContent, Role};

/// Every compaction summary message starts with this marker.
pub const CONTEXT_SUMMARY_PREFIX: &str = "[Context Summary";

const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve names, decisions, tool outcomes, and \
     any facts that may matter to future turns. The summary will replace the original \
     history to free up context space.";

/// The role consulted for compaction calls.
pub const COMPACTION_ROLE: &str = "fast";

/// Build the single-user-message prompt asking the model to summarise
/// `prefix`.
pub fn summary_request(prefix: &[Message]) -> Message {
    let history = serialize_history(prefix);
    Message::user(format!("{SUMMARIZE_PROMPT}\n\n---\n\n{history}"))
}

/// Wrap a model-produced summary into the replacement system message.
pub fn summary_message(summary: &str) -> Message {
    Message::system(format!("{CONTEXT_SUMMARY_PREFIX} — earlier conversation]\n{summary}"))
}

/// Serialise messages into plain text for the compaction prompt.
fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
                Role::System => "System",
            };
            let text = match &m.content {
                MessageContent::Text(t) => t.clone(),
                MessageContent::ToolCall { function, .. } => {
                    format!("[tool_call: {}({})]", function.name, function.arguments)
                }
                MessageContent::ToolResult { content, .. } => {
                    format!("[tool_result: {content}]")
                }
            };
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
