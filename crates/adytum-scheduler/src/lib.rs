// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod job;
mod scheduler;
mod store;

pub use job::{
    backoff_for, parse_schedule, schedule_kind_of, CronJob, JobState, JobStatus, ScheduleError,
    ScheduleKind, BACKOFF_SCHEDULE,
};
pub use scheduler::{
    evaluate_tick, CronScheduler, JobExecutor, JobPatch, NewJob, SchedulerError, TickDecision,
};
pub use store::CronStore;
