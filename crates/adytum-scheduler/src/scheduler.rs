// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Recurring and one-shot job execution with a run-in-progress guard,
//! error backoff, and a per-job timeout race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use adytum_agent::{cron_session_id, RuntimeRegistry};
use adytum_config::CronConfig;

use crate::{
    job::{backoff_for, parse_schedule, schedule_kind_of, CronJob, JobState, JobStatus,
        ScheduleKind},
    store::CronStore,
};

/// Executes one job run.  The production implementation drives the agent
/// runtime; tests substitute scripted executors.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run(
        &self,
        task: &str,
        session_id: &str,
        agent_id: Option<&str>,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Schedule(#[from] crate::job::ScheduleError),
    #[error("no job with id {0}")]
    UnknownJob(String),
    #[error("job {0} is already running")]
    AlreadyRunning(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Why a tick did or did not run.  Pure decision, separated from execution
/// so the guard order is directly testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Run,
    DropRunning,
    DropBackoff,
    DropRefireGap,
}

/// Guard order: run-in-progress, then backoff, then the 2 s spin-loop gap.
pub fn evaluate_tick(state: &JobState, now_ms: i64, min_refire_gap_ms: u64) -> TickDecision {
    if state.running_at_ms.is_some() {
        return TickDecision::DropRunning;
    }
    if let (Some(last), Some(backoff)) = (
        state.last_run_at_ms,
        backoff_for(state.consecutive_errors),
    ) {
        if last + backoff.as_millis() as i64 > now_ms {
            return TickDecision::DropBackoff;
        }
    }
    if let Some(last) = state.last_run_at_ms {
        if now_ms - last < min_refire_gap_ms as i64 {
            return TickDecision::DropRefireGap;
        }
    }
    TickDecision::Run
}

/// New-job parameters for [`CronScheduler::add_job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub schedule: String,
    pub task: String,
    pub target_agent_id: Option<String>,
    pub delete_after_run: bool,
    pub timeout_ms: Option<u64>,
    pub enabled: bool,
}

/// Fields of [`CronScheduler::update_job`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub task: Option<String>,
    pub enabled: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub target_agent_id: Option<Option<String>>,
}

struct Inner {
    jobs: Mutex<HashMap<String, CronJob>>,
    store: CronStore,
    executor: Arc<dyn JobExecutor>,
    runtimes: Arc<RuntimeRegistry>,
    config: CronConfig,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct CronScheduler {
    inner: Arc<Inner>,
}

impl CronScheduler {
    /// Load jobs from the store (stale running markers are cleared by the
    /// store) and persist the scrubbed state back.
    pub fn load(
        store: CronStore,
        executor: Arc<dyn JobExecutor>,
        runtimes: Arc<RuntimeRegistry>,
        config: CronConfig,
    ) -> anyhow::Result<Self> {
        let jobs = store.load()?;
        let map: HashMap<String, CronJob> =
            jobs.into_iter().map(|j| (j.id.clone(), j)).collect();
        let scheduler = Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(map),
                store,
                executor,
                runtimes,
                config,
                timers: Mutex::new(HashMap::new()),
            }),
        };
        scheduler.persist()?;
        Ok(scheduler)
    }

    fn persist(&self) -> anyhow::Result<()> {
        let jobs = self.inner.jobs.lock().expect("job lock poisoned");
        let mut list: Vec<CronJob> = jobs.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        self.inner.store.save(&list)
    }

    /// Arm timers for every enabled job.
    pub fn start(&self) {
        let ids: Vec<String> = {
            let jobs = self.inner.jobs.lock().expect("job lock poisoned");
            jobs.values()
                .filter(|j| j.enabled)
                .map(|j| j.id.clone())
                .collect()
        };
        for id in ids {
            self.arm(&id);
        }
    }

    /// Cancel all timers (process shutdown).
    pub fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().expect("timer lock poisoned");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    fn disarm(&self, id: &str) {
        if let Some(handle) = self
            .inner
            .timers
            .lock()
            .expect("timer lock poisoned")
            .remove(id)
        {
            handle.abort();
        }
    }

    fn arm(&self, id: &str) {
        self.disarm(id);
        let scheduler = self.clone();
        let job_id = id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let next = {
                    let jobs = scheduler.inner.jobs.lock().expect("job lock poisoned");
                    match jobs.get(&job_id) {
                        Some(job) if job.enabled => job.next_fire_after(Utc::now()),
                        _ => None,
                    }
                };
                let Some(next) = next else {
                    debug!(job = %job_id, "no further fire times; timer ends");
                    break;
                };
                {
                    let mut jobs = scheduler.inner.jobs.lock().expect("job lock poisoned");
                    if let Some(job) = jobs.get_mut(&job_id) {
                        job.state.next_run_at_ms = Some(next.timestamp_millis());
                    }
                }
                let wait = (next - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_millis(0));
                tokio::time::sleep(wait).await;
                scheduler.tick(&job_id).await;
                // One-shots fire once; their record is finalised in tick.
                let one_shot = {
                    let jobs = scheduler.inner.jobs.lock().expect("job lock poisoned");
                    jobs.get(&job_id)
                        .map(|j| j.schedule_kind == ScheduleKind::OneShot)
                        .unwrap_or(true)
                };
                if one_shot {
                    break;
                }
            }
        });
        self.inner
            .timers
            .lock()
            .expect("timer lock poisoned")
            .insert(id.to_string(), handle);
    }

    /// One scheduler tick for `id`: refresh state, apply the guards, and
    /// execute when allowed.
    pub async fn tick(&self, id: &str) {
        let decision = {
            let jobs = self.inner.jobs.lock().expect("job lock poisoned");
            let Some(job) = jobs.get(id) else { return };
            if !job.enabled {
                return;
            }
            evaluate_tick(
                &job.state,
                Utc::now().timestamp_millis(),
                self.inner.config.min_refire_gap_ms,
            )
        };
        match decision {
            TickDecision::Run => self.execute(id).await,
            other => {
                debug!(job = id, ?other, "tick dropped");
            }
        }
    }

    /// Manual fire: bypasses backoff and the refire gap, but still refuses
    /// while a run is in flight.
    pub async fn trigger_job(&self, id: &str) -> Result<(), SchedulerError> {
        {
            let jobs = self.inner.jobs.lock().expect("job lock poisoned");
            let job = jobs
                .get(id)
                .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
            if job.state.running_at_ms.is_some() {
                return Err(SchedulerError::AlreadyRunning(id.to_string()));
            }
        }
        self.execute(id).await;
        Ok(())
    }

    /// Run the job now.  Stamps `running_at_ms`, races the executor against
    /// the job timeout, and clears the marker on every exit path.
    async fn execute(&self, id: &str) {
        let started_ms = Utc::now().timestamp_millis();
        let (task, session, agent, timeout_ms) = {
            let mut jobs = self.inner.jobs.lock().expect("job lock poisoned");
            let Some(job) = jobs.get_mut(id) else { return };
            if job.state.running_at_ms.is_some() {
                return;
            }
            job.state.running_at_ms = Some(started_ms);
            (
                job.task.clone(),
                cron_session_id(&job.id),
                job.target_agent_id.clone(),
                if job.timeout_ms > 0 {
                    job.timeout_ms
                } else {
                    self.inner.config.default_timeout_ms
                },
            )
        };
        if let Err(e) = self.persist() {
            warn!(job = id, error = %e, "failed to persist running marker");
        }
        info!(job = id, session = %session, "cron job starting");

        let run = self
            .inner
            .executor
            .run(&task, &session, agent.as_deref());
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), run).await;

        let (status, error) = match &outcome {
            Ok(Ok(_)) => (JobStatus::Ok, None),
            Ok(Err(e)) => (JobStatus::Error, Some(e.to_string())),
            Err(_) => {
                // The turn lost the race; cancel its runtime tree so the
                // stray work stops consuming the session.
                self.inner.runtimes.abort_hierarchy(&session);
                (
                    JobStatus::Timeout,
                    Some(format!("timed out after {timeout_ms}ms")),
                )
            }
        };
        let duration_ms = (Utc::now().timestamp_millis() - started_ms).max(0) as u64;

        let mut remove = false;
        {
            let mut jobs = self.inner.jobs.lock().expect("job lock poisoned");
            if let Some(job) = jobs.get_mut(id) {
                job.state.running_at_ms = None;
                job.state.last_run_at_ms = Some(started_ms);
                job.state.last_status = Some(status);
                job.state.last_duration_ms = Some(duration_ms);
                job.state.last_error = error.clone();
                if status == JobStatus::Ok {
                    job.state.consecutive_errors = 0;
                } else {
                    job.state.consecutive_errors += 1;
                }
                if job.schedule_kind == ScheduleKind::OneShot {
                    if job.delete_after_run && status == JobStatus::Ok {
                        remove = true;
                    } else {
                        job.enabled = false;
                    }
                }
            }
            if remove {
                jobs.remove(id);
            }
        }
        if let Err(e) = self.persist() {
            warn!(job = id, error = %e, "failed to persist job state");
        }
        info!(job = id, ?status, duration_ms, "cron job finished");
    }

    // ── Public CRUD ops ──────────────────────────────────────────────────────

    pub fn add_job(&self, new: NewJob) -> Result<CronJob, SchedulerError> {
        parse_schedule(&new.schedule)?;
        let job = CronJob {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            schedule_kind: schedule_kind_of(&new.schedule),
            schedule: new.schedule,
            task: new.task,
            target_agent_id: new.target_agent_id,
            enabled: new.enabled,
            delete_after_run: new.delete_after_run,
            timeout_ms: new
                .timeout_ms
                .unwrap_or(self.inner.config.default_timeout_ms),
            state: JobState::default(),
        };
        self.inner
            .jobs
            .lock()
            .expect("job lock poisoned")
            .insert(job.id.clone(), job.clone());
        self.persist()?;
        if job.enabled {
            self.arm(&job.id);
        }
        Ok(job)
    }

    /// Update fields; a schedule or enabled change re-arms the timer and
    /// aborts any in-flight run of the job.
    pub fn update_job(&self, id: &str, patch: JobPatch) -> Result<CronJob, SchedulerError> {
        if let Some(s) = &patch.schedule {
            parse_schedule(s)?;
        }
        let (job, rearm) = {
            let mut jobs = self.inner.jobs.lock().expect("job lock poisoned");
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
            let mut rearm = false;
            if let Some(name) = patch.name {
                job.name = name;
            }
            if let Some(schedule) = patch.schedule {
                job.schedule_kind = schedule_kind_of(&schedule);
                job.schedule = schedule;
                rearm = true;
            }
            if let Some(task) = patch.task {
                job.task = task;
            }
            if let Some(enabled) = patch.enabled {
                if job.enabled != enabled {
                    rearm = true;
                }
                job.enabled = enabled;
            }
            if let Some(timeout) = patch.timeout_ms {
                job.timeout_ms = timeout;
            }
            if let Some(target) = patch.target_agent_id {
                job.target_agent_id = target;
            }
            (job.clone(), rearm)
        };
        self.persist()?;
        if rearm {
            self.inner.runtimes.abort_hierarchy(&cron_session_id(id));
            self.disarm(id);
            if job.enabled {
                self.arm(id);
            }
        }
        Ok(job)
    }

    pub fn pause_job(&self, id: &str) -> Result<(), SchedulerError> {
        {
            let mut jobs = self.inner.jobs.lock().expect("job lock poisoned");
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
            job.enabled = false;
        }
        self.disarm(id);
        self.persist()?;
        Ok(())
    }

    /// Re-enable a paused job, clearing its error state.
    pub fn resume_job(&self, id: &str) -> Result<(), SchedulerError> {
        {
            let mut jobs = self.inner.jobs.lock().expect("job lock poisoned");
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
            job.enabled = true;
            job.state.consecutive_errors = 0;
            job.state.last_error = None;
        }
        self.persist()?;
        self.arm(id);
        Ok(())
    }

    pub fn remove_job(&self, id: &str) -> Result<(), SchedulerError> {
        self.inner.runtimes.abort_hierarchy(&cron_session_id(id));
        self.disarm(id);
        let removed = self
            .inner
            .jobs
            .lock()
            .expect("job lock poisoned")
            .remove(id)
            .is_some();
        if !removed {
            return Err(SchedulerError::UnknownJob(id.to_string()));
        }
        self.persist()?;
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Option<CronJob> {
        self.inner
            .jobs
            .lock()
            .expect("job lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn get_jobs(&self) -> Vec<CronJob> {
        let mut jobs: Vec<CronJob> = self
            .inner
            .jobs
            .lock()
            .expect("job lock poisoned")
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    /// Human-readable status line for one job.
    pub fn job_status(&self, id: &str) -> Option<String> {
        let job = self.get_job(id)?;
        let state = if !job.enabled {
            "paused".to_string()
        } else if job.state.running_at_ms.is_some() {
            "running".to_string()
        } else {
            "idle".to_string()
        };
        let last = match (job.state.last_run_at_ms, job.state.last_status) {
            (Some(ms), Some(status)) => {
                let ago = (Utc::now().timestamp_millis() - ms).max(0) as u64;
                let ago = humantime::format_duration(Duration::from_secs(ago / 1000));
                format!("last {status:?} {ago} ago")
            }
            _ => "never run".to_string(),
        };
        let errors = if job.state.consecutive_errors > 0 {
            format!(", {} consecutive errors", job.state.consecutive_errors)
        } else {
            String::new()
        };
        Some(format!(
            "{} [{}] schedule '{}': {last}{errors}",
            job.name, state, job.schedule
        ))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
