// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome text stored on a trace is capped at this many characters.
const OUTCOME_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One turn's execution envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub parent_trace_id: Option<String>,
    pub initial_goal: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    /// Truncated final text.
    #[serde(default)]
    pub outcome: Option<String>,
}

impl Trace {
    pub fn start(
        session_id: impl Into<String>,
        goal: impl Into<String>,
        parent_trace_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            parent_trace_id,
            initial_goal: goal.into(),
            start_time: Utc::now(),
            end_time: None,
            status: TraceStatus::Running,
            outcome: None,
        }
    }

    pub fn finish(&mut self, status: TraceStatus, outcome: &str) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.outcome = Some(truncate_outcome(outcome));
    }
}

/// Cap at [`OUTCOME_CAP`] characters on a char boundary.
pub fn truncate_outcome(text: &str) -> String {
    if text.chars().count() <= OUTCOME_CAP {
        text.to_string()
    } else {
        let cut: String = text.chars().take(OUTCOME_CAP).collect();
        format!("{cut}…")
    }
}
