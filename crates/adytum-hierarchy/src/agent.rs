// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an agent is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Runs only when spoken to.
    Reactive,
    /// Long-lived background worker.
    Daemon,
    /// Driven by the cron scheduler.
    Scheduled,
}

/// Model-id bound per tier: workers get short chains, coordinators longer.
pub fn model_id_bound(tier: u8) -> usize {
    match tier {
        3 => 3,
        _ => 5,
    }
}

/// One identity in the agent hierarchy.
///
/// `last_breath` is `None` exactly while the agent is active.  Exactly one
/// tier-1 root exists; every other agent carries a parent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMeta {
    pub id: String,
    pub name: String,
    /// 1 = root, 2 = manager/coordinator, 3 = operative/worker.
    pub tier: u8,
    pub role: String,
    pub parent_id: Option<String>,
    pub birth_time: DateTime<Utc>,
    #[serde(default)]
    pub last_breath: Option<DateTime<Utc>>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Bounded by [`model_id_bound`] for the agent's tier.
    #[serde(default)]
    pub model_ids: Vec<String>,
    #[serde(default)]
    pub active_session_id: Option<String>,
    #[serde(default)]
    pub mode: Option<AgentMode>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Cron expression for `Scheduled` agents.
    #[serde(default)]
    pub schedule: Option<String>,
}

impl AgentMeta {
    pub fn is_active(&self) -> bool {
        self.last_breath.is_none()
    }
}

/// Per-agent append-only log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub kind: AgentLogKind,
    pub content: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentLogKind {
    Thought,
    Action,
    Interaction,
}
