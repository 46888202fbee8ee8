// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod audit;
mod compact;
mod context;
mod events;
mod registry;
mod runtime;
mod session;
mod spawn;
mod trace;

pub use audit::{AuditLog, AuditRecord, SecurityRecord};
pub use compact::{summary_message, summary_request, COMPACTION_ROLE, CONTEXT_SUMMARY_PREFIX};
pub use context::ContextManager;
pub use events::{AgentEvent, StreamEnvelope};
pub use registry::RuntimeRegistry;
pub use runtime::{
    mine_user_fact, AgentRuntime, RunOverrides, RuntimeConfig, ToolCallRecord, TurnOutcome,
    HEARTBEAT_PREAMBLE,
};
pub use session::{cron_session_id, new_session_id, new_subagent_session_id, SessionKind};
pub use spawn::{SpawnOutcome, SpawnRequest, SpawnSubAgentTool, SubAgentSpawner};
pub use trace::{truncate_outcome, Trace, TraceStatus};
