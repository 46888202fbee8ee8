// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adytum_agent::AgentRuntime;
use adytum_model::ModelRouter;

use crate::approval::ApprovalBroker;

/// A registered workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkspace {
    pub name: String,
    pub path: String,
}

/// Shared state behind every gateway handler.
pub struct GatewayState {
    pub runtime: Arc<AgentRuntime>,
    pub router: Arc<ModelRouter>,
    pub broker: Arc<ApprovalBroker>,
    workspaces: Mutex<Vec<Workspace>>,
}

impl GatewayState {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        router: Arc<ModelRouter>,
        broker: Arc<ApprovalBroker>,
    ) -> Self {
        Self {
            runtime,
            router,
            broker,
            workspaces: Mutex::new(Vec::new()),
        }
    }

    pub fn add_workspace(&self, new: NewWorkspace) -> Workspace {
        let workspace = Workspace {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            path: new.path,
        };
        self.workspaces
            .lock()
            .expect("workspace lock poisoned")
            .push(workspace.clone());
        workspace
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.workspaces
            .lock()
            .expect("workspace lock poisoned")
            .clone()
    }

    /// Returns `true` when a workspace was removed.
    pub fn remove_workspace(&self, id: &str) -> bool {
        let mut ws = self.workspaces.lock().expect("workspace lock poisoned");
        let before = ws.len();
        ws.retain(|w| w.id != id);
        ws.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_serialises_camel_case() {
        let w = Workspace {
            id: "w1".into(),
            name: "repo".into(),
            path: "/srv/repo".into(),
        };
        let text = serde_json::to_string(&w).unwrap();
        assert!(text.contains("\"id\":\"w1\""));
        assert!(text.contains("\"path\""));
    }
}
