// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use uuid::Uuid;

/// Classification of a session id by its prefix convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Interactive,
    /// `cron-<jobId>`, driven by the scheduler.
    Scheduled,
    /// `system-<name>` — internal background work (dreamer, heartbeat).
    System,
    /// `sub-<id>` — spawned sub-agent turn.
    Subagent,
}

impl SessionKind {
    pub fn classify(session_id: &str) -> Self {
        if session_id.starts_with("cron-") {
            Self::Scheduled
        } else if session_id.starts_with("system-") {
            Self::System
        } else if session_id.starts_with("sub-") {
            Self::Subagent
        } else {
            Self::Interactive
        }
    }

    /// Background sessions get an isolated context: their prompts and
    /// results never enter the interactive history.
    pub fn is_background(&self) -> bool {
        matches!(self, Self::Scheduled | Self::System)
    }
}

/// Mint a fresh interactive session id.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mint a sub-agent session id.
pub fn new_subagent_session_id() -> String {
    format!("sub-{}", Uuid::new_v4())
}

/// The session id used for a cron job's turns.
pub fn cron_session_id(job_id: &str) -> String {
    format!("cron-{job_id}")
}
