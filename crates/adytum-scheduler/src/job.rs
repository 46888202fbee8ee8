// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backoff ladder indexed by consecutive errors − 1, capped at the last
/// entry: 30 s, 1 m, 5 m, 15 m, 60 m.
pub const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(900),
    Duration::from_secs(3600),
];

/// Backoff for a job with `errors` consecutive failures (`None` when clean).
pub fn backoff_for(errors: u32) -> Option<Duration> {
    if errors == 0 {
        return None;
    }
    let idx = ((errors - 1) as usize).min(BACKOFF_SCHEDULE.len() - 1);
    Some(BACKOFF_SCHEDULE[idx])
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),
    #[error("invalid one-shot timestamp '{0}'")]
    InvalidAt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    Cron,
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Error,
    Skipped,
    Timeout,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub last_run_at_ms: Option<i64>,
    #[serde(default)]
    pub last_status: Option<JobStatus>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_duration_ms: Option<u64>,
    #[serde(default)]
    pub consecutive_errors: u32,
    /// Set while a tick is executing; at most one execution per job.
    /// Cleared on every exit path and scrubbed at load (crash residue).
    #[serde(default)]
    pub running_at_ms: Option<i64>,
    #[serde(default)]
    pub next_run_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    /// Cron expression, or `at:<epochMs>` for a one-shot.
    pub schedule: String,
    /// The prompt handed to the agent on each run.
    pub task: String,
    #[serde(default)]
    pub target_agent_id: Option<String>,
    pub enabled: bool,
    pub schedule_kind: ScheduleKind,
    /// One-shot only: remove the record after a successful run.
    #[serde(default)]
    pub delete_after_run: bool,
    pub timeout_ms: u64,
    #[serde(default)]
    pub state: JobState,
}

/// Parsed form of the schedule string.
pub enum ParsedSchedule {
    Cron(cron::Schedule),
    At(i64),
}

/// Validate and parse a schedule string.
pub fn parse_schedule(schedule: &str) -> Result<ParsedSchedule, ScheduleError> {
    if let Some(ts) = schedule.strip_prefix("at:") {
        let ms: i64 = ts
            .parse()
            .map_err(|_| ScheduleError::InvalidAt(schedule.to_string()))?;
        return Ok(ParsedSchedule::At(ms));
    }
    // The cron crate wants a seconds field; accept the common 5-field form
    // by prepending "0 ".
    let normalized = if schedule.split_whitespace().count() == 5 {
        format!("0 {schedule}")
    } else {
        schedule.to_string()
    };
    cron::Schedule::from_str(&normalized)
        .map(ParsedSchedule::Cron)
        .map_err(|e| ScheduleError::InvalidCron(schedule.to_string(), e.to_string()))
}

/// Kind implied by a schedule string.
pub fn schedule_kind_of(schedule: &str) -> ScheduleKind {
    if schedule.starts_with("at:") {
        ScheduleKind::OneShot
    } else {
        ScheduleKind::Cron
    }
}

impl CronJob {
    /// Next fire time strictly after `now`, or `None` for exhausted
    /// schedules (a one-shot in the past).
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match parse_schedule(&self.schedule).ok()? {
            ParsedSchedule::Cron(s) => s.after(&now).next(),
            ParsedSchedule::At(ms) => {
                let at = Utc.timestamp_millis_opt(ms).single()?;
                (at > now).then_some(at)
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
