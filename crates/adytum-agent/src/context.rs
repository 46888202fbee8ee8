// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use adytum_model::Message;

/// Per-session message buffer plus the single system prompt.
///
/// The buffer never contains the system prompt itself; [`get_messages`]
/// splices it in front so the prompt can be rebuilt (soul or skill changes)
/// without touching history.
#[derive(Debug)]
pub struct ContextManager {
    system_prompt: String,
    messages: Vec<Message>,
    /// Soft token budget; compaction fires above it.
    soft_limit: usize,
}

impl ContextManager {
    pub fn new(soft_limit: usize) -> Self {
        Self {
            system_prompt: String::new(),
            messages: Vec::new(),
            soft_limit,
        }
    }

    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.system_prompt = text.into();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn add_message(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// `[system, …messages]`, the wire order for a model call.
    pub fn get_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(self.system_prompt.clone()));
        out.extend(self.messages.iter().cloned());
        out
    }

    /// History without the system prompt.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get_message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Roll history back to `len` messages (cancelled-turn recovery).
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Conservative token estimate: per-message word heuristic plus the
    /// system prompt.
    pub fn estimate_tokens(&self) -> usize {
        let system = Message::system(self.system_prompt.clone()).approx_tokens();
        system + self.messages.iter().map(|m| m.approx_tokens()).sum::<usize>()
    }

    /// True when the estimate exceeds the soft limit (or an explicit one).
    pub fn needs_compaction(&self, limit: Option<usize>) -> bool {
        let limit = limit.unwrap_or(self.soft_limit);
        limit > 0 && self.estimate_tokens() > limit
    }

    pub fn soft_limit(&self) -> usize {
        self.soft_limit
    }

    /// A message this large (over half the window) gets pre-summarised
    /// before it is ever added.
    pub fn is_oversized(&self, msg: &Message) -> bool {
        self.soft_limit > 0 && msg.approx_tokens() > self.soft_limit / 2
    }

    /// The compaction cut point: the largest index ≤ `len − keep_trailing`
    /// such that the message at the index is not a tool result AND the one
    /// before it is not an assistant tool call.  Retreats until both hold,
    /// so a tool-call/tool-result pair is never split.  Returns 0 when no
    /// valid cut exists (compaction becomes a no-op).
    pub fn safe_cut_index(&self, keep_trailing: usize) -> usize {
        let mut cut = self.messages.len().saturating_sub(keep_trailing);
        while cut > 0
            && (self.messages[cut].is_tool_result() || self.messages[cut - 1].is_tool_call())
        {
            cut -= 1;
        }
        cut
    }

    /// Replace `messages[..cut]` with a single summary system message.
    /// The trailing messages stay byte-identical.
    pub fn replace_prefix_with_summary(&mut self, cut: usize, summary_message: Message) {
        let tail = self.messages.split_off(cut);
        self.messages = Vec::with_capacity(tail.len() + 1);
        self.messages.push(summary_message);
        self.messages.extend(tail);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
