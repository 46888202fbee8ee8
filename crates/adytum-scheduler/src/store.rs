// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

use crate::job::CronJob;

/// Persistence for `cron.json`: full-file rewrite with atomic rename.
pub struct CronStore {
    path: Option<PathBuf>,
}

impl CronStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// In-memory store for tests.
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Load all jobs.  Any `running_at_ms` residue from a previous crash is
    /// cleared; nothing can still be executing across a restart.
    pub fn load(&self) -> anyhow::Result<Vec<CronJob>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut jobs: Vec<CronJob> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        for job in &mut jobs {
            if job.state.running_at_ms.take().is_some() {
                warn!(job = %job.id, "cleared stale running marker from previous run");
            }
        }
        Ok(jobs)
    }

    pub fn save(&self, jobs: &[CronJob]) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        atomic_write(path, jobs)
    }
}

fn atomic_write(path: &Path, jobs: &[CronJob]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(jobs)?)
        .with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} over {}", tmp.display(), path.display()))?;
    Ok(())
}
