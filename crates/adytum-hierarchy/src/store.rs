// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Full-file persistence with atomic rename.
//!
//! Every registry mutation rewrites the complete document: a temp file is
//! written next to the target and renamed over it, so readers never observe
//! a partial write and a crash leaves the previous version intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{AgentLogEntry, AgentMeta};

/// The persisted document shape of `agents.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyDoc {
    #[serde(default)]
    pub agents: Vec<AgentMeta>,
    #[serde(default)]
    pub logs: HashMap<String, Vec<AgentLogEntry>>,
}

pub struct HierarchyStore {
    path: Option<PathBuf>,
}

impl HierarchyStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// In-memory store (tests): `save` is a no-op, `load` yields empty.
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    pub fn load(&self) -> anyhow::Result<HierarchyDoc> {
        let Some(path) = &self.path else {
            return Ok(HierarchyDoc::default());
        };
        if !path.exists() {
            return Ok(HierarchyDoc::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, doc: &HierarchyDoc) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        atomic_write_json(path, doc)
    }
}

/// Serialise `value` to pretty JSON and atomically replace `path`.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} over {}", tmp.display(), path.display()))?;
    Ok(())
}
