// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end turns against scripted providers: happy path, tool loop,
//! approval denial, batch spawn reuse, and cascading cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use adytum_agent::{
    AgentRuntime, AuditLog, RunOverrides, RuntimeConfig, RuntimeRegistry, SpawnRequest,
    SubAgentSpawner, TraceStatus,
};
use adytum_config::{AgentConfig, ModelsConfig};
use adytum_hierarchy::{AgentRegistry, BirthParams};
use adytum_memory::NullMemory;
use adytum_model::{
    AdapterFactory, ApiFamily, Catalog, ChatOptions, ChatOutcome, CredentialResolver, Message,
    MockAdapter, ModelCatalogEntry, ModelRouter, ProviderAdapter, ProviderError, ResolvedAuth,
    Role, ScriptedMockAdapter,
};
use adytum_tools::{
    ApprovalHandler, AutoApprove, DenyAll, Tool, ToolCall, ToolRegistry, ToolResult,
};

struct FixedFactory {
    adapter: Arc<dyn ProviderAdapter>,
}

impl AdapterFactory for FixedFactory {
    fn adapter_for(
        &self,
        _entry: &ModelCatalogEntry,
        _auth: &ResolvedAuth,
    ) -> Arc<dyn ProviderAdapter> {
        Arc::clone(&self.adapter)
    }
}

fn test_entry() -> ModelCatalogEntry {
    ModelCatalogEntry {
        id: "m-test".into(),
        name: "m-test".into(),
        provider: "mock".into(),
        api: ApiFamily::Mock,
        base_url: None,
        context_window: 100_000,
        max_output_tokens: 8192,
        input_cost_per_mtok: 0.0,
        output_cost_per_mtok: 0.0,
        description: String::new(),
    }
}

fn test_router(adapter: Arc<dyn ProviderAdapter>) -> Arc<ModelRouter> {
    let mut models = ModelsConfig::default();
    models
        .roles
        .insert("thinking".into(), vec!["mock/m-test".into()]);
    let catalog = Catalog::from_entries(vec![test_entry()]);
    let credentials = Arc::new(CredentialResolver::new(HashMap::new(), "default"));
    Arc::new(ModelRouter::new(
        &models,
        catalog,
        credentials,
        Box::new(FixedFactory { adapter }),
    ))
}

struct Fixture {
    runtime: Arc<AgentRuntime>,
    audit: Arc<AuditLog>,
    sessions: Arc<RuntimeRegistry>,
}

fn fixture(
    adapter: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    approvals: Arc<dyn ApprovalHandler>,
) -> Fixture {
    let audit = Arc::new(AuditLog::new());
    let sessions = Arc::new(RuntimeRegistry::new());
    let runtime = Arc::new(AgentRuntime::new(
        RuntimeConfig {
            agent_name: "Sentinel".into(),
            role: "thinking".into(),
            soul: "You are Sentinel, the resident overseer.".into(),
            agent: AgentConfig::default(),
        },
        test_router(adapter),
        tools,
        Arc::new(NullMemory),
        approvals,
        Arc::clone(&audit),
        Arc::clone(&sessions),
    ));
    Fixture {
        runtime,
        audit,
        sessions,
    }
}

// ─── Scenario: single-turn happy path ─────────────────────────────────────────

#[tokio::test]
async fn single_turn_happy_path() {
    let adapter = Arc::new(ScriptedMockAdapter::always_text("hello"));
    let f = fixture(adapter, Arc::new(ToolRegistry::new()), Arc::new(AutoApprove));

    let outcome = f
        .runtime
        .run("hi", "session-1", RunOverrides::default())
        .await;

    assert_eq!(outcome.response, "hello");
    assert_eq!(outcome.trace.status, TraceStatus::Completed);
    assert!(outcome.tool_calls.is_empty());

    let records = f.audit.flush();
    let starts = records.iter().filter(|r| r.kind == "trace_start").count();
    let ends = records.iter().filter(|r| r.kind == "trace_end").count();
    assert_eq!(starts, 1);
    assert_eq!(ends, 1);

    let history = f.runtime.history("session-1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].as_text(), Some("hi"));
    assert_eq!(history[1].as_text(), Some("hello"));
}

// ─── Scenario: tool-call loop ─────────────────────────────────────────────────

struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "search the web"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }
    async fn execute(&self, call: &ToolCall) -> ToolResult {
        ToolResult::ok(&call.id, "sunny, 22C")
    }
}

#[tokio::test]
async fn tool_call_loop_round_trips_results() {
    let adapter = Arc::new(ScriptedMockAdapter::tool_then_text(
        "c1",
        "web_search",
        json!({"query": "weather"}),
        "It's sunny, 22°C.",
    ));
    let tools = Arc::new(ToolRegistry::new());
    tools.register(WeatherTool);
    let f = fixture(adapter, tools, Arc::new(AutoApprove));

    let outcome = f
        .runtime
        .run("what is the weather", "session-w", RunOverrides::default())
        .await;

    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].name, "web_search");
    assert_eq!(outcome.tool_calls[0].result, "sunny, 22C");
    assert_eq!(outcome.response, "It's sunny, 22°C.");

    // History suffix: user, assistant(tool_call c1), tool(c1), assistant.
    let history = f.runtime.history("session-w").await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].as_text(), Some("what is the weather"));
    assert!(history[1].is_tool_call());
    assert!(history[2].is_tool_result());
    match &history[2].content {
        adytum_model::MessageContent::ToolResult {
            tool_call_id,
            content,
            ..
        } => {
            assert_eq!(tool_call_id, "c1");
            assert_eq!(content, "sunny, 22C");
        }
        _ => panic!("expected tool result"),
    }
    assert_eq!(history[3].as_text(), Some("It's sunny, 22°C."));
}

// ─── Scenario: approval denied ────────────────────────────────────────────────

struct FlaggedShellTool {
    executed: Arc<AtomicBool>,
}

#[async_trait]
impl Tool for FlaggedShellTool {
    fn name(&self) -> &str {
        "shell_execute"
    }
    fn description(&self) -> &str {
        "run a shell command"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"command": {"type": "string"}}})
    }
    fn requires_approval(&self) -> bool {
        true
    }
    async fn execute(&self, call: &ToolCall) -> ToolResult {
        self.executed.store(true, Ordering::SeqCst);
        ToolResult::ok(&call.id, "ran anyway")
    }
}

#[tokio::test]
async fn approval_denial_short_circuits_without_executing() {
    let executed = Arc::new(AtomicBool::new(false));
    let adapter = Arc::new(ScriptedMockAdapter::tool_then_text(
        "c1",
        "shell_execute",
        json!({"command": "rm -r build"}),
        "Understood, skipping that.",
    ));
    let tools = Arc::new(ToolRegistry::new());
    tools.register(FlaggedShellTool {
        executed: Arc::clone(&executed),
    });
    let f = fixture(Arc::clone(&adapter) as Arc<dyn ProviderAdapter>, tools, Arc::new(DenyAll));

    let outcome = f
        .runtime
        .run("clean the build dir", "session-d", RunOverrides::default())
        .await;

    assert!(
        !executed.load(Ordering::SeqCst),
        "denied tool body must never run"
    );
    let history = f.runtime.history("session-d").await;
    let rejection = history.iter().any(|m| {
        matches!(
            &m.content,
            adytum_model::MessageContent::ToolResult { content, .. }
                if content == "Action rejected by user."
        )
    });
    assert!(rejection, "synthetic rejection message must be in history");
    // The loop continued to a second model call after the denial.
    assert_eq!(adapter.call_count(), 2);
    assert_eq!(outcome.response, "Understood, skipping that.");
}

// ─── Scenario: batch spawn reuse ──────────────────────────────────────────────

/// Echo adapter that yields before answering, so concurrently spawned
/// sub-agent turns stay in flight long enough for the reuse lookup of a
/// later batch item to observe the earlier item's birth.
struct PausingEchoAdapter;

#[async_trait]
impl ProviderAdapter for PausingEchoAdapter {
    fn family(&self) -> &str {
        "mock"
    }
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reply = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]");
        Ok(ChatOutcome::text(format!("MOCK: {reply}")))
    }
}

fn hierarchy_with_root() -> Arc<AgentRegistry> {
    let reg = Arc::new(AgentRegistry::ephemeral());
    reg.birth(BirthParams {
        name: "Root".into(),
        tier: 1,
        role: "overseer".into(),
        ..Default::default()
    })
    .unwrap();
    reg
}

#[tokio::test]
async fn batch_spawn_reuses_named_agent_and_preserves_order() {
    let f = fixture(
        Arc::new(PausingEchoAdapter),
        Arc::new(ToolRegistry::new()),
        Arc::new(AutoApprove),
    );
    let hierarchy = hierarchy_with_root();
    let spawner = SubAgentSpawner::new(Arc::clone(&f.runtime), Arc::clone(&hierarchy));

    let outcomes = spawner
        .spawn_batch(vec![
            SpawnRequest {
                goal: "A".into(),
                name: Some("Viper".into()),
                ..Default::default()
            },
            SpawnRequest {
                goal: "B".into(),
                name: Some("Viper".into()),
                ..Default::default()
            },
        ])
        .await;

    let a = outcomes[0].as_ref().expect("A completes");
    let b = outcomes[1].as_ref().expect("B completes");
    // Output order follows input order.
    assert!(a.result.contains("A"), "first result is A's: {}", a.result);
    assert!(b.result.contains("B"), "second result is B's: {}", b.result);
    // One birth only: both items resolved to the same agent.
    assert_eq!(a.agent_id, b.agent_id);
    let vipers: Vec<_> = hierarchy
        .get_active()
        .into_iter()
        .chain(hierarchy.get_graveyard())
        .filter(|ag| ag.name.eq_ignore_ascii_case("viper"))
        .collect();
    assert_eq!(vipers.len(), 1, "exactly one Viper must exist");
}

#[tokio::test]
async fn sequential_spawn_reuse_yields_same_agent_and_session() {
    let f = fixture(
        Arc::new(MockAdapter),
        Arc::new(ToolRegistry::new()),
        Arc::new(AutoApprove),
    );
    let hierarchy = hierarchy_with_root();
    let spawner = SubAgentSpawner::new(Arc::clone(&f.runtime), Arc::clone(&hierarchy));

    let first = spawner
        .spawn(SpawnRequest {
            goal: "scout".into(),
            name: Some("Viper".into()),
            deactivate_after: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    let second = spawner
        .spawn(SpawnRequest {
            goal: "report".into(),
            name: Some("Viper".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(first.agent_id, second.agent_id);
    assert_eq!(first.session_id, second.session_id);
    // Reused agents default to staying active.
    assert!(hierarchy.find_active_by_name("Viper").is_some());
}

// ─── Scenario: cascading cancel ───────────────────────────────────────────────

struct SlowAdapter;

#[async_trait]
impl ProviderAdapter for SlowAdapter {
    fn family(&self) -> &str {
        "mock"
    }
    async fn chat(
        &self,
        _model: &str,
        _messages: &[Message],
        _opts: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ChatOutcome::text("too late"))
    }
}

#[tokio::test]
async fn abort_hierarchy_cancels_root_child_and_grandchild() {
    let f = fixture(
        Arc::new(SlowAdapter),
        Arc::new(ToolRegistry::new()),
        Arc::new(AutoApprove),
    );

    // Pre-register the session tree so the aborter sees the edges.
    f.sessions.register("R", None);
    f.sessions.register("C1", Some("R"));
    f.sessions.register("C2", Some("C1"));

    let runs: Vec<_> = ["R", "C1", "C2"]
        .into_iter()
        .map(|sid| {
            let rt = Arc::clone(&f.runtime);
            tokio::spawn(async move { rt.run("work forever", sid, RunOverrides::default()).await })
        })
        .collect();

    // Let every turn reach its model-call suspension point, then abort.
    tokio::time::sleep(Duration::from_millis(100)).await;
    f.sessions.abort_hierarchy("R");

    for run in runs {
        let outcome = run.await.unwrap();
        assert_eq!(outcome.trace.status, TraceStatus::Cancelled);
        assert!(outcome.tool_calls.is_empty(), "no tools after cancel");
    }
    // No partial content was committed to any session's history.
    for sid in ["R", "C1", "C2"] {
        assert!(
            f.runtime.history(sid).await.is_empty(),
            "cancelled turn must not mutate history for {sid}"
        );
    }
}

// ─── Error path: ephemeral errors never enter history ────────────────────────

#[tokio::test]
async fn failed_turn_does_not_commit_error_text() {
    let adapter = Arc::new(ScriptedMockAdapter::always_err(ProviderError::Transport(
        "ECONNREFUSED".into(),
    )));
    let f = fixture(adapter, Arc::new(ToolRegistry::new()), Arc::new(AutoApprove));

    let outcome = f
        .runtime
        .run("hello?", "session-e", RunOverrides::default())
        .await;

    assert_eq!(outcome.trace.status, TraceStatus::Failed);
    assert!(outcome.response.contains("can't reach the model provider"));
    let history = f.runtime.history("session-e").await;
    // The user message stays; no assistant/error text is committed.
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].as_text(), Some("hello?"));
}

// ─── Background isolation ─────────────────────────────────────────────────────

#[tokio::test]
async fn background_sessions_use_isolated_context() {
    let adapter = Arc::new(ScriptedMockAdapter::new(vec![
        Ok(ChatOutcome::text("background done")),
        Ok(ChatOutcome::text("interactive reply")),
    ]));
    let f = fixture(adapter, Arc::new(ToolRegistry::new()), Arc::new(AutoApprove));

    f.runtime
        .run("STATUS: heartbeat sweep", "cron-job1", RunOverrides::default())
        .await;
    f.runtime
        .run("hello", "chat-main", RunOverrides::default())
        .await;

    let interactive = f.runtime.history("chat-main").await;
    assert!(
        interactive
            .iter()
            .all(|m| !m.as_text().unwrap_or_default().starts_with("STATUS:")),
        "background prompt must not leak into the interactive history"
    );
    let background = f.runtime.history("cron-job1").await;
    assert_eq!(background.len(), 2);
}
