// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    agent::model_id_bound, AgentLogEntry, AgentLogKind, AgentMeta, AgentMode, HierarchyDoc,
    HierarchyStore,
};

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("tier must be 1, 2 or 3 (got {0})")]
    InvalidTier(u8),
    #[error("a tier-1 root already exists ({0})")]
    RootExists(String),
    #[error("tier-{0} agents require a parent id")]
    MissingParent(u8),
    #[error("the tier-1 root cannot have a parent")]
    RootWithParent,
    #[error("no agent with id {0}")]
    UnknownAgent(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Parameters for [`AgentRegistry::birth`].
#[derive(Debug, Clone, Default)]
pub struct BirthParams {
    pub name: String,
    pub tier: u8,
    pub role: String,
    pub parent_id: Option<String>,
    /// When absent a fresh session id is minted.
    pub session_id: Option<String>,
    pub model_ids: Vec<String>,
    pub avatar: Option<String>,
    pub mode: Option<AgentMode>,
    pub topics: Vec<String>,
    pub schedule: Option<String>,
}

/// Owns the agent hierarchy.  Every mutation persists by full-file rewrite.
pub struct AgentRegistry {
    store: HierarchyStore,
    state: Mutex<HierarchyDoc>,
}

impl AgentRegistry {
    /// Load from the store (missing file → empty hierarchy).
    pub fn open(store: HierarchyStore) -> anyhow::Result<Self> {
        let state = store.load()?;
        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    pub fn ephemeral() -> Self {
        Self {
            store: HierarchyStore::ephemeral(),
            state: Mutex::new(HierarchyDoc::default()),
        }
    }

    /// Create a new active agent.
    ///
    /// Tier bounds the model-id list (tier 3 ≤ 3, tiers 1–2 ≤ 5; extras are
    /// silently truncated).  A second tier-1 root is rejected.  Name
    /// collisions among active agents are deliberately legal: reuse is a
    /// lookup concern, not a creation constraint.
    pub fn birth(&self, params: BirthParams) -> Result<AgentMeta, HierarchyError> {
        if !(1..=3).contains(&params.tier) {
            return Err(HierarchyError::InvalidTier(params.tier));
        }
        let mut state = self.state.lock().expect("hierarchy lock poisoned");
        if params.tier == 1 {
            if params.parent_id.is_some() {
                return Err(HierarchyError::RootWithParent);
            }
            if let Some(root) = state.agents.iter().find(|a| a.tier == 1) {
                return Err(HierarchyError::RootExists(root.id.clone()));
            }
        } else if params.parent_id.is_none() {
            return Err(HierarchyError::MissingParent(params.tier));
        }

        let mut model_ids = params.model_ids;
        model_ids.truncate(model_id_bound(params.tier));

        let meta = AgentMeta {
            id: Uuid::new_v4().to_string(),
            name: params.name.trim().to_string(),
            tier: params.tier,
            role: params.role,
            parent_id: params.parent_id,
            birth_time: Utc::now(),
            last_breath: None,
            avatar: params.avatar,
            model_ids,
            active_session_id: Some(
                params
                    .session_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
            mode: params.mode,
            topics: params.topics,
            schedule: params.schedule,
        };
        info!(agent = %meta.id, name = %meta.name, tier = meta.tier, "agent born");
        state.agents.push(meta.clone());
        self.store.save(&state)?;
        Ok(meta)
    }

    /// Deactivate an agent: stamp the end time and clear its session.
    pub fn last_breath(&self, id: &str) -> Result<(), HierarchyError> {
        let mut state = self.state.lock().expect("hierarchy lock poisoned");
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| HierarchyError::UnknownAgent(id.to_string()))?;
        agent.last_breath = Some(Utc::now());
        agent.active_session_id = None;
        info!(agent = %id, "last breath");
        self.store.save(&state)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<AgentMeta> {
        let state = self.state.lock().expect("hierarchy lock poisoned");
        state.agents.iter().find(|a| a.id == id).cloned()
    }

    pub fn get_active(&self) -> Vec<AgentMeta> {
        let state = self.state.lock().expect("hierarchy lock poisoned");
        state
            .agents
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    pub fn get_graveyard(&self) -> Vec<AgentMeta> {
        let state = self.state.lock().expect("hierarchy lock poisoned");
        state
            .agents
            .iter()
            .filter(|a| !a.is_active())
            .cloned()
            .collect()
    }

    pub fn get_children(&self, parent_id: &str) -> Vec<AgentMeta> {
        let state = self.state.lock().expect("hierarchy lock poisoned");
        state
            .agents
            .iter()
            .filter(|a| a.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    /// First active agent whose name matches, ignoring case and surrounding
    /// whitespace.  Global name uniqueness is not enforced, so two active
    /// holders are possible; callers get the first in insertion order.
    pub fn find_active_by_name(&self, name: &str) -> Option<AgentMeta> {
        let wanted = name.trim().to_lowercase();
        let state = self.state.lock().expect("hierarchy lock poisoned");
        state
            .agents
            .iter()
            .find(|a| a.is_active() && a.name.trim().to_lowercase() == wanted)
            .cloned()
    }

    pub fn set_avatar(&self, id: &str, avatar: impl Into<String>) -> Result<(), HierarchyError> {
        self.mutate(id, |a| a.avatar = Some(avatar.into()))
    }

    /// Replace the model chain, re-applying the tier bound.
    pub fn set_model_ids(&self, id: &str, model_ids: Vec<String>) -> Result<(), HierarchyError> {
        self.mutate(id, move |a| {
            let mut ids = model_ids;
            ids.truncate(model_id_bound(a.tier));
            a.model_ids = ids;
        })
    }

    pub fn set_name(&self, id: &str, name: impl Into<String>) -> Result<(), HierarchyError> {
        let name = name.into();
        self.mutate(id, move |a| a.name = name.trim().to_string())
    }

    /// Seconds since birth for an active agent, `0` otherwise.
    pub fn get_uptime_seconds(&self, id: &str) -> i64 {
        match self.get(id) {
            Some(a) if a.is_active() => (Utc::now() - a.birth_time).num_seconds().max(0),
            _ => 0,
        }
    }

    /// Append to an agent's log.
    pub fn log(
        &self,
        id: &str,
        kind: AgentLogKind,
        content: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), HierarchyError> {
        let mut state = self.state.lock().expect("hierarchy lock poisoned");
        if !state.agents.iter().any(|a| a.id == id) {
            return Err(HierarchyError::UnknownAgent(id.to_string()));
        }
        state
            .logs
            .entry(id.to_string())
            .or_insert_with(Vec::new)
            .push(AgentLogEntry {
                kind,
                content: content.into(),
                payload,
                at: Utc::now(),
            });
        self.store.save(&state)?;
        Ok(())
    }

    pub fn get_log(&self, id: &str) -> Vec<AgentLogEntry> {
        let state = self.state.lock().expect("hierarchy lock poisoned");
        state.logs.get(id).cloned().unwrap_or_default()
    }

    fn mutate<F>(&self, id: &str, f: F) -> Result<(), HierarchyError>
    where
        F: FnOnce(&mut AgentMeta),
    {
        let mut state = self.state.lock().expect("hierarchy lock poisoned");
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| HierarchyError::UnknownAgent(id.to_string()))?;
        f(agent);
        debug!(agent = %id, "agent updated");
        self.store.save(&state)?;
        Ok(())
    }

    /// Map of parent id → child ids for the runtime registry's cascade.
    pub fn edges(&self) -> HashMap<String, Vec<String>> {
        let state = self.state.lock().expect("hierarchy lock poisoned");
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for a in &state.agents {
            if let Some(parent) = &a.parent_id {
                edges.entry(parent.clone()).or_default().push(a.id.clone());
            }
        }
        edges
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
