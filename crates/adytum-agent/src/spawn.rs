// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Sub-agent spawning: single and batched, with active-name reuse and
//! cancellation that cascades through the runtime registry.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use adytum_hierarchy::{AgentLogKind, AgentRegistry, BirthParams};
use adytum_tools::{parse_args, Tool, ToolCall, ToolResult};

use crate::{
    runtime::{AgentRuntime, RunOverrides, ToolCallRecord},
    session::new_subagent_session_id,
    trace::truncate_outcome,
};

/// One spawn request.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    pub goal: String,
    /// Active-agent reuse key (trimmed, case-insensitive).
    pub name: Option<String>,
    /// Free-text role recorded on a newly born agent.
    pub role: Option<String>,
    /// Router role override for the child's turns.
    pub model: Option<String>,
    pub tier: Option<u8>,
    pub parent_agent_id: Option<String>,
    pub parent_session_id: Option<String>,
    pub parent_trace_id: Option<String>,
    /// `None` applies the defaults: reused agents stay active, newly born
    /// agents take their last breath after the run.
    pub deactivate_after: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub result: String,
    pub trace_id: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub agent_id: String,
    pub session_id: String,
}

pub struct SubAgentSpawner {
    runtime: Arc<AgentRuntime>,
    hierarchy: Arc<AgentRegistry>,
}

impl SubAgentSpawner {
    pub fn new(runtime: Arc<AgentRuntime>, hierarchy: Arc<AgentRegistry>) -> Self {
        Self { runtime, hierarchy }
    }

    pub fn hierarchy(&self) -> &Arc<AgentRegistry> {
        &self.hierarchy
    }

    /// Spawn one sub-agent turn and wait for its result.
    ///
    /// Reuse rule: a supplied name matching an *active* agent reuses that
    /// agent's id and active session (`deactivate_after` defaults false);
    /// otherwise a new agent is born with a fresh session (`deactivate_after`
    /// defaults true).
    pub async fn spawn(&self, request: SpawnRequest) -> anyhow::Result<SpawnOutcome> {
        let reuse = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .and_then(|n| self.hierarchy.find_active_by_name(n));

        let (agent_id, session_id, default_deactivate) = match reuse {
            Some(agent) => {
                debug!(agent = %agent.id, name = %agent.name, "reusing active agent");
                let session = agent
                    .active_session_id
                    .clone()
                    .unwrap_or_else(new_subagent_session_id);
                (agent.id, session, false)
            }
            None => {
                let tier = request.tier.unwrap_or(3).clamp(1, 3);
                let parent_agent = match request.parent_agent_id.clone() {
                    Some(p) => Some(p),
                    None => self
                        .hierarchy
                        .get_active()
                        .into_iter()
                        .find(|a| a.tier == 1)
                        .map(|a| a.id),
                };
                let session = new_subagent_session_id();
                let name = request
                    .name
                    .clone()
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("agent-{}", &session[4..12]));
                let agent = self.hierarchy.birth(BirthParams {
                    name,
                    tier,
                    role: request.role.clone().unwrap_or_else(|| "operative".into()),
                    parent_id: parent_agent,
                    session_id: Some(session.clone()),
                    ..Default::default()
                })?;
                (agent.id, session, true)
            }
        };
        let deactivate_after = request.deactivate_after.unwrap_or(default_deactivate);

        // Register the child under its parent before the turn starts so a
        // hierarchy abort issued mid-run reaches it.
        self.runtime
            .runtime_registry()
            .register(&session_id, request.parent_session_id.as_deref());

        // Re-emit child stream events on the parent's channel.
        let forwarder = request.parent_session_id.clone().map(|parent| {
            let mut rx = self.runtime.subscribe();
            let runtime = Arc::clone(&self.runtime);
            let child = session_id.clone();
            tokio::spawn(async move {
                while let Ok(env) = rx.recv().await {
                    if env.session_id == child && !env.is_sub_agent {
                        runtime.forward(env.reemitted(&parent));
                    }
                }
            })
        });

        let outcome = self
            .runtime
            .run(
                &request.goal,
                &session_id,
                RunOverrides {
                    role: request.model.clone(),
                    agent_id: Some(agent_id.clone()),
                    parent_session_id: request.parent_session_id.clone(),
                    parent_trace_id: request.parent_trace_id.clone(),
                    ..Default::default()
                },
            )
            .await;

        if let Some(handle) = forwarder {
            handle.abort();
        }
        self.runtime.runtime_registry().unregister(&session_id);

        // Audit trail on the agent itself, truncated to keep records small.
        let _ = self.hierarchy.log(
            &agent_id,
            AgentLogKind::Action,
            truncate_outcome(&outcome.response),
            json!({ "trace_id": outcome.trace.id, "goal": truncate_outcome(&request.goal) }),
        );

        if deactivate_after {
            let _ = self.hierarchy.last_breath(&agent_id);
        }

        Ok(SpawnOutcome {
            result: outcome.response,
            trace_id: outcome.trace.id,
            tool_calls: outcome.tool_calls,
            agent_id,
            session_id,
        })
    }

    /// Execute a batch concurrently; results join in input order.
    pub async fn spawn_batch(&self, requests: Vec<SpawnRequest>) -> Vec<anyhow::Result<SpawnOutcome>> {
        join_all(requests.into_iter().map(|r| self.spawn(r))).await
    }
}

// ─── The user-visible tool ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SpawnItem {
    goal: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    deactivate_after: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SpawnArgs {
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    deactivate_after: Option<bool>,
    /// When present the single-spawn fields are ignored.
    #[serde(default)]
    batch: Option<Vec<SpawnItem>>,
}

pub struct SpawnSubAgentTool {
    spawner: Arc<SubAgentSpawner>,
}

impl SpawnSubAgentTool {
    pub fn new(spawner: Arc<SubAgentSpawner>) -> Self {
        Self { spawner }
    }

    fn item_to_request(item: SpawnItem, call: &ToolCall) -> SpawnRequest {
        SpawnRequest {
            goal: item.goal,
            name: item.name,
            role: item.role,
            model: item.model,
            parent_agent_id: item.parent_id,
            parent_session_id: call.session_id.clone(),
            parent_trace_id: call.trace_id.clone(),
            deactivate_after: item.deactivate_after,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Tool for SpawnSubAgentTool {
    fn name(&self) -> &str {
        "spawn_sub_agent"
    }

    fn description(&self) -> &str {
        "Delegate a goal to a sub-agent and return its answer. Reuses an \
         active agent when `name` matches one. Pass `batch` to run several \
         goals concurrently; results come back in input order."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal": { "type": "string", "description": "Task for the sub-agent" },
                "name": { "type": "string", "description": "Agent name; reuses an active agent when it matches" },
                "role": { "type": "string", "description": "Role description for a newly created agent" },
                "model": { "type": "string", "description": "Router role override for the child" },
                "deactivate_after": { "type": "boolean", "description": "Retire the agent after the run" },
                "batch": {
                    "type": "array",
                    "description": "Run several spawns concurrently",
                    "items": {
                        "type": "object",
                        "properties": {
                            "goal": { "type": "string" },
                            "name": { "type": "string" },
                            "role": { "type": "string" },
                            "parent_id": { "type": "string" },
                            "model": { "type": "string" },
                            "deactivate_after": { "type": "boolean" }
                        },
                        "required": ["goal"]
                    }
                }
            }
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args: SpawnArgs = match parse_args(call) {
            Ok(a) => a,
            Err(e) => return e,
        };

        if let Some(batch) = args.batch {
            if batch.is_empty() {
                return ToolResult::err(&call.id, "batch must contain at least one item");
            }
            let requests: Vec<SpawnRequest> = batch
                .into_iter()
                .map(|item| Self::item_to_request(item, call))
                .collect();
            let labels: Vec<String> = requests
                .iter()
                .map(|r| r.name.clone().unwrap_or_else(|| r.goal.clone()))
                .collect();
            let outcomes = self.spawner.spawn_batch(requests).await;

            let mut sections = Vec::with_capacity(outcomes.len());
            for (label, outcome) in labels.into_iter().zip(outcomes) {
                match outcome {
                    Ok(o) => sections.push(format!("### {label}\n{}", o.result)),
                    Err(e) => sections.push(format!("### {label}\n(spawn failed: {e})")),
                }
            }
            return ToolResult::ok(&call.id, sections.join("\n\n"));
        }

        let Some(goal) = args.goal else {
            return ToolResult::err(&call.id, "either 'goal' or 'batch' is required");
        };
        let request = SpawnRequest {
            goal,
            name: args.name,
            role: args.role,
            model: args.model,
            parent_session_id: call.session_id.clone(),
            parent_trace_id: call.trace_id.clone(),
            deactivate_after: args.deactivate_after,
            ..Default::default()
        };
        match self.spawner.spawn(request).await {
            Ok(o) => ToolResult::ok(&call.id, o.result),
            Err(e) => ToolResult::err(&call.id, format!("spawn failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
