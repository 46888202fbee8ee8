// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

use crate::trace::TraceStatus;

/// Events emitted by the agent runtime during a turn.
/// Consumers (gateway websocket, audit log, spawner re-emitter) subscribe
/// to the runtime's stream channel.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Progress note ("Thinking… iteration 2").
    Status(String),
    /// The model requested a tool call.
    ToolCallStarted {
        call_id: String,
        name: String,
        args: Value,
    },
    /// A tool call finished (or was rejected).
    ToolResultReady {
        call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// The final textual answer of the turn.
    Response(String),
    TraceStart {
        trace_id: String,
    },
    TraceEnd {
        trace_id: String,
        status: TraceStatus,
    },
}

impl AgentEvent {
    /// Short kind tag used for audit records and websocket frames.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::ToolCallStarted { .. } => "tool_call",
            Self::ToolResultReady { .. } => "tool_result",
            Self::Response(_) => "response",
            Self::TraceStart { .. } => "trace_start",
            Self::TraceEnd { .. } => "trace_end",
        }
    }
}

/// An event wrapped with its origin session and sub-agent metadata.
///
/// When a sub-agent's events are re-emitted on its parent's channel,
/// `is_sub_agent` is set and `child_session_id` names the origin.
#[derive(Debug, Clone)]
pub struct StreamEnvelope {
    pub session_id: String,
    pub event: AgentEvent,
    pub is_sub_agent: bool,
    pub child_session_id: Option<String>,
}

impl StreamEnvelope {
    pub fn local(session_id: impl Into<String>, event: AgentEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event,
            is_sub_agent: false,
            child_session_id: None,
        }
    }

    /// Re-wrap a child envelope for the parent's channel.
    pub fn reemitted(self, parent_session: &str) -> Self {
        Self {
            child_session_id: Some(self.session_id.clone()),
            session_id: parent_session.to_string(),
            is_sub_agent: true,
            event: self.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags() {
        assert_eq!(AgentEvent::Status("x".into()).kind(), "status");
        assert_eq!(AgentEvent::Response("x".into()).kind(), "response");
    }

    #[test]
    fn reemission_sets_sub_agent_metadata() {
        let env = StreamEnvelope::local("sub-1", AgentEvent::Status("working".into()));
        let re = env.reemitted("parent-session");
        assert!(re.is_sub_agent);
        assert_eq!(re.session_id, "parent-session");
        assert_eq!(re.child_session_id.as_deref(), Some("sub-1"));
    }
}
