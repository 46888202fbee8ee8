// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent runtime: think → (tool calls | answer) → observe → repeat.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use adytum_config::AgentConfig;
use adytum_memory::{MemoryCategory, MemoryFact, MemoryStore};
use adytum_model::{
    ChatOptions, Message, ModelRouter, RouterError, ToolInvocation, ToolSchema,
};
use adytum_tools::{ApprovalDecision, ApprovalHandler, ApprovalRequest, ToolCall, ToolRegistry,
    ToolResult};

use crate::{
    audit::AuditLog,
    compact::{summary_message, summary_request, COMPACTION_ROLE},
    context::ContextManager,
    events::{AgentEvent, StreamEnvelope},
    registry::RuntimeRegistry,
    session::SessionKind,
    trace::{truncate_outcome, Trace, TraceStatus},
};

/// Sentinel prefixes that mark background-prompt residue in a shared
/// context.  Backgrounds run isolated by construction; the scrub below is a
/// belt for histories written by older builds.
const BACKGROUND_SENTINELS: [&str; 2] = ["STATUS:", "SUMMARY:"];
pub const HEARTBEAT_PREAMBLE: &str = "You are the heartbeat process";

const CANCELLED_RESPONSE: &str = "This task was cancelled before it finished.";
const REJECTED_RESPONSE: &str = "Action rejected by user.";
const NO_USABLE_RESPONSE: &str =
    "I wasn't able to produce a usable response for this request.";

/// Static configuration of one runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub agent_name: String,
    /// Router role consulted for normal turns.
    pub role: String,
    /// Soul preamble prepended to every system prompt.
    pub soul: String,
    pub agent: AgentConfig,
}

/// Per-turn overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub role: Option<String>,
    pub temperature: Option<f32>,
    pub max_iterations: Option<u32>,
    pub agent_id: Option<String>,
    pub parent_session_id: Option<String>,
    pub parent_trace_id: Option<String>,
}

/// One executed (or rejected) tool call in a turn.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub args: serde_json::Value,
    pub result: String,
    pub is_error: bool,
}

/// The result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub trace: Trace,
    pub tool_calls: Vec<ToolCallRecord>,
}

enum LoopExit {
    Done(String),
    Cancelled,
    Failed(String),
    Capped,
}

pub struct AgentRuntime {
    config: RuntimeConfig,
    router: Arc<ModelRouter>,
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryStore>,
    approvals: Arc<dyn ApprovalHandler>,
    audit: Arc<AuditLog>,
    sessions: Arc<RuntimeRegistry>,
    contexts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<ContextManager>>>>,
    /// Skill labels listed in the system prompt.
    skills: RwLock<Vec<String>>,
    stream_tx: broadcast::Sender<StreamEnvelope>,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        router: Arc<ModelRouter>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
        approvals: Arc<dyn ApprovalHandler>,
        audit: Arc<AuditLog>,
        sessions: Arc<RuntimeRegistry>,
    ) -> Self {
        let (stream_tx, _) = broadcast::channel(1024);
        Self {
            config,
            router,
            tools,
            memory,
            approvals,
            audit,
            sessions,
            contexts: Mutex::new(HashMap::new()),
            skills: RwLock::new(Vec::new()),
            stream_tx,
        }
    }

    /// Subscribe to this runtime's stream events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEnvelope> {
        self.stream_tx.subscribe()
    }

    pub fn runtime_registry(&self) -> &Arc<RuntimeRegistry> {
        &self.sessions
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Replace the skill list shown in the system prompt, then rebuild it.
    pub async fn set_skills(&self, labels: Vec<String>) {
        *self.skills.write().expect("skill list lock poisoned") = labels;
        self.refresh_system_prompt().await;
    }

    /// Recompose the system prompt and apply it to every live context.
    /// Called after soul or skill changes.
    pub async fn refresh_system_prompt(&self) {
        let prompt = self.compose_system_prompt();
        let contexts: Vec<Arc<tokio::sync::Mutex<ContextManager>>> = self
            .contexts
            .lock()
            .expect("context map lock poisoned")
            .values()
            .cloned()
            .collect();
        for ctx in contexts {
            ctx.lock().await.set_system_prompt(prompt.clone());
        }
    }

    /// Soul preamble + tools header + available skills + behavioural rules.
    pub fn compose_system_prompt(&self) -> String {
        let mut prompt = String::new();
        if !self.config.soul.is_empty() {
            prompt.push_str(&self.config.soul);
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Tools\n");
        for schema in self.tools.wire_schemas() {
            prompt.push_str(&format!("- {}: {}\n", schema.name, schema.description));
        }
        let skills = self.skills.read().expect("skill list lock poisoned");
        if !skills.is_empty() {
            prompt.push_str("\n## Available skills\n");
            for s in skills.iter() {
                prompt.push_str(&format!("- {s}\n"));
            }
        }
        prompt.push_str(
            "\n## Rules\n\
             - Use tools when a task needs real data or side effects; answer directly otherwise.\n\
             - Report failures honestly instead of inventing results.\n\
             - Keep answers concise.\n",
        );
        prompt
    }

    fn context_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<ContextManager>> {
        let mut contexts = self.contexts.lock().expect("context map lock poisoned");
        contexts
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let mut ctx = ContextManager::new(self.config.agent.context_soft_limit);
                ctx.set_system_prompt(self.compose_system_prompt());
                Arc::new(tokio::sync::Mutex::new(ctx))
            })
            .clone()
    }

    /// History snapshot for a session (gateway/dashboard use).
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let ctx = self.context_for(session_id);
        let guard = ctx.lock().await;
        guard.messages().to_vec()
    }

    fn emit(&self, session_id: &str, trace_id: &str, event: AgentEvent) {
        let detail = match &event {
            AgentEvent::Status(s) => json!({ "text": s }),
            AgentEvent::ToolCallStarted { call_id, name, args } => {
                json!({ "call_id": call_id, "name": name, "args": args })
            }
            AgentEvent::ToolResultReady {
                call_id,
                name,
                content,
                is_error,
            } => json!({
                "call_id": call_id, "name": name,
                "content": truncate_outcome(content), "is_error": is_error
            }),
            AgentEvent::Response(text) => json!({ "text": truncate_outcome(text) }),
            AgentEvent::TraceStart { .. } => json!({}),
            AgentEvent::TraceEnd { status, .. } => json!({ "status": format!("{status:?}") }),
        };
        let kind = match &event {
            AgentEvent::TraceStart { .. } => "trace_start".to_string(),
            AgentEvent::TraceEnd { .. } => "trace_end".to_string(),
            other => format!("stream.{}", other.kind()),
        };
        self.audit.publish(trace_id, session_id, kind, detail);
        let _ = self
            .stream_tx
            .send(StreamEnvelope::local(session_id, event));
    }

    fn wire_tools(&self) -> Vec<ToolSchema> {
        self.tools
            .wire_schemas()
            .into_iter()
            .map(|s| ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    async fn execute_tool(
        &self,
        call: &ToolInvocation,
        session_id: &str,
        trace_id: &str,
    ) -> ToolResult {
        let wire = ToolCall::new(call.id.clone(), call.name.clone(), call.arguments.clone())
            .with_context(session_id, trace_id);
        self.tools.execute(&wire).await
    }

    /// Summarise free text via the fast role, falling back to the runtime's
    /// main role when no fast chain is configured.
    async fn summarize(&self, prompt: Message) -> Option<String> {
        let messages = [prompt];
        let result = match self
            .router
            .chat(COMPACTION_ROLE, &messages, &ChatOptions::default())
            .await
        {
            Err(RouterError::NoChain(_)) => {
                self.router
                    .chat(&self.config.role, &messages, &ChatOptions::default())
                    .await
            }
            other => other,
        };
        match result {
            Ok(reply) if !reply.message.content.is_empty() => Some(reply.message.content),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "summarisation call failed");
                None
            }
        }
    }

    /// Safe-cut compaction.  A failed or empty summary leaves the context
    /// untouched; the turn proceeds with the full history.
    async fn compact(&self, ctx: &mut ContextManager, session_id: &str, trace_id: &str) {
        let cut = ctx.safe_cut_index(self.config.agent.compaction_keep_trailing);
        if cut == 0 {
            return;
        }
        let prefix = ctx.messages()[..cut].to_vec();
        match self.summarize(summary_request(&prefix)).await {
            Some(summary) => {
                ctx.replace_prefix_with_summary(cut, summary_message(&summary));
                self.emit(
                    session_id,
                    trace_id,
                    AgentEvent::Status(format!("Compacted {cut} earlier messages.")),
                );
            }
            None => {
                warn!(session = session_id, "compaction skipped: no summary produced");
            }
        }
    }

    /// Run one turn for `session_id`.
    ///
    /// Never returns an error: every failure path maps to a user-friendly
    /// response with `trace.status == Failed`, and ephemeral error text is
    /// not committed to the session history.
    pub async fn run(
        &self,
        user_message: &str,
        session_id: &str,
        overrides: RunOverrides,
    ) -> TurnOutcome {
        let pre_registered = self.sessions.is_session_active(session_id);
        let cancel = self
            .sessions
            .register(session_id, overrides.parent_session_id.as_deref());

        let mut trace = Trace::start(
            session_id,
            truncate_outcome(user_message),
            overrides.parent_trace_id.clone(),
        );
        self.emit(
            session_id,
            &trace.id.clone(),
            AgentEvent::TraceStart {
                trace_id: trace.id.clone(),
            },
        );
        if let Some(agent_id) = &overrides.agent_id {
            self.audit.publish(
                &trace.id,
                session_id,
                "stream.agent",
                json!({ "agent_id": agent_id, "agent_name": self.config.agent_name }),
            );
        }

        let kind = SessionKind::classify(session_id);
        let ctx_arc = self.context_for(session_id);
        let mut ctx = ctx_arc.lock().await;

        // Prompt-leakage guard for the interactive history.
        if kind == SessionKind::Interactive && has_background_sentinels(ctx.messages()) {
            ctx.clear();
            self.emit(
                session_id,
                &trace.id,
                AgentEvent::Status("Cleared background-prompt residue from context.".into()),
            );
        }

        // Oversized input is pre-summarised before it enters history.
        let mut user_text = user_message.to_string();
        if ctx.is_oversized(&Message::user(user_text.clone())) {
            if let Some(sum) = self
                .summarize(Message::user(format!(
                    "Summarise the following input in a dense, factual way:\n\n{user_text}"
                )))
                .await
            {
                user_text = format!("[Summarised input] {sum}");
            }
        }

        let checkpoint = ctx.get_message_count();
        ctx.add_message(Message::user(user_text.clone()));

        if kind == SessionKind::Interactive && self.config.agent.mine_user_facts {
            if let Some(fact) = mine_user_fact(&user_text) {
                debug!(fact = %fact, "mined user fact");
                let _ = self
                    .memory
                    .insert(MemoryFact::new(fact, MemoryCategory::UserFact, "chat"));
            }
        }

        // Relevant-memories addendum: spliced behind the system prompt for
        // the model call only, never stored in the session history.
        let addendum = {
            let facts = self.memory.search(&user_text, 5);
            if facts.is_empty() {
                None
            } else {
                let lines: Vec<String> =
                    facts.iter().map(|f| format!("- {}", f.content)).collect();
                Some(Message::system(format!(
                    "Relevant memories:\n{}",
                    lines.join("\n")
                )))
            }
        };

        let role = overrides
            .role
            .clone()
            .unwrap_or_else(|| self.config.role.clone());
        let temperature = overrides
            .temperature
            .unwrap_or(self.config.agent.temperature);
        let max_iterations = overrides
            .max_iterations
            .unwrap_or(self.config.agent.max_iterations)
            .max(1);

        let mut tool_records: Vec<ToolCallRecord> = Vec::new();
        let mut last_text = String::new();

        let exit = 'turn: {
            for i in 1..=max_iterations {
                if cancel.is_cancelled() {
                    break 'turn LoopExit::Cancelled;
                }
                if ctx.needs_compaction(None) {
                    self.compact(&mut ctx, session_id, &trace.id).await;
                }
                self.emit(
                    session_id,
                    &trace.id,
                    AgentEvent::Status(format!("Thinking… iteration {i}")),
                );

                let mut wire = ctx.get_messages();
                if let Some(add) = &addendum {
                    wire.insert(1, add.clone());
                }
                let opts = ChatOptions {
                    tools: self.wire_tools(),
                    temperature: Some(temperature),
                    max_tokens: None,
                };
                // The model call is a suspension point: cancellation aborts
                // it instead of waiting for the reply.
                let reply = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'turn LoopExit::Cancelled,
                    r = self.router.chat(&role, &wire, &opts) => match r {
                        Ok(r) => r,
                        Err(e) => break 'turn LoopExit::Failed(friendly_router_error(&e)),
                    },
                };
                self.audit.publish(
                    &trace.id,
                    session_id,
                    "stream.usage",
                    json!({
                        "model": reply.model_id,
                        "prompt_tokens": reply.usage.prompt_tokens,
                        "completion_tokens": reply.usage.completion_tokens,
                    }),
                );

                if !reply.message.has_tool_calls() {
                    let text = reply.message.content.clone();
                    if text.is_empty() {
                        // Empty-response recovery: the canned sentence is
                        // returned and streamed, but never committed.
                        self.emit(
                            session_id,
                            &trace.id,
                            AgentEvent::Response(NO_USABLE_RESPONSE.to_string()),
                        );
                        break 'turn LoopExit::Done(NO_USABLE_RESPONSE.to_string());
                    }
                    ctx.add_message(Message::assistant(&text));
                    self.emit(session_id, &trace.id, AgentEvent::Response(text.clone()));
                    break 'turn LoopExit::Done(text);
                }

                // Tool-call round.  The assistant's tool-call messages are
                // appended before any execution so every tool result in
                // history is preceded by its matching call.
                if !reply.message.content.is_empty() {
                    last_text = reply.message.content.clone();
                    ctx.add_message(Message::assistant(&reply.message.content));
                }
                for call in &reply.message.tool_calls {
                    ctx.add_message(Message::tool_call(
                        &call.id,
                        &call.name,
                        call.arguments.clone(),
                    ));
                }

                for call in &reply.message.tool_calls {
                    if cancel.is_cancelled() {
                        break 'turn LoopExit::Cancelled;
                    }
                    self.emit(
                        session_id,
                        &trace.id,
                        AgentEvent::ToolCallStarted {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        },
                    );

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'turn LoopExit::Cancelled,
                        r = self.gated_execute(call, session_id, &trace.id) => r,
                    };
                    ctx.add_message(Message::tool_result(
                        &result.call_id,
                        &result.content,
                        result.is_error,
                    ));
                    self.emit(
                        session_id,
                        &trace.id,
                        AgentEvent::ToolResultReady {
                            call_id: result.call_id.clone(),
                            name: call.name.clone(),
                            content: result.content.clone(),
                            is_error: result.is_error,
                        },
                    );
                    tool_records.push(ToolCallRecord {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                        result: result.content,
                        is_error: result.is_error,
                    });
                }
            }
            LoopExit::Capped
        };

        let response = match exit {
            LoopExit::Done(text) => {
                trace.finish(TraceStatus::Completed, &text);
                text
            }
            LoopExit::Cancelled => {
                // The cancelled turn leaves no mark on persistent history.
                ctx.truncate(checkpoint);
                trace.finish(TraceStatus::Cancelled, CANCELLED_RESPONSE);
                CANCELLED_RESPONSE.to_string()
            }
            LoopExit::Failed(message) => {
                trace.finish(TraceStatus::Failed, &message);
                message
            }
            LoopExit::Capped => {
                let note = format!(
                    "(Stopped after reaching the limit of {max_iterations} reasoning iterations.)"
                );
                let text = if last_text.is_empty() {
                    note
                } else {
                    format!("{last_text}\n\n{note}")
                };
                trace.finish(TraceStatus::Completed, &text);
                text
            }
        };

        self.emit(
            session_id,
            &trace.id.clone(),
            AgentEvent::TraceEnd {
                trace_id: trace.id.clone(),
                status: trace.status,
            },
        );
        drop(ctx);
        if !pre_registered {
            self.sessions.unregister(session_id);
        }

        TurnOutcome {
            response,
            trace,
            tool_calls: tool_records,
        }
    }

    /// Approval gate + execution.  Denial never reaches the tool body; the
    /// synthetic rejection result keeps the loop going.
    async fn gated_execute(
        &self,
        call: &ToolInvocation,
        session_id: &str,
        trace_id: &str,
    ) -> ToolResult {
        if self.tools.requires_approval(&call.name) {
            let request = ApprovalRequest {
                id: Uuid::new_v4().to_string(),
                description: describe_call(call),
                kind: call.name.clone(),
            };
            self.audit.security(
                "approval_requested",
                json!({ "session": session_id, "tool": call.name, "request": request.id }),
            );
            match self.approvals.decide(request).await {
                ApprovalDecision::Approved => {}
                ApprovalDecision::Denied => {
                    self.audit.security(
                        "approval_denied",
                        json!({ "session": session_id, "tool": call.name }),
                    );
                    return ToolResult::ok(&call.id, REJECTED_RESPONSE);
                }
            }
        }
        self.execute_tool(call, session_id, trace_id).await
    }

    /// Re-emit an envelope on this runtime's stream channel.  Used by the
    /// spawner to surface child events on the parent session.
    pub fn forward(&self, envelope: StreamEnvelope) {
        let _ = self.stream_tx.send(envelope);
    }
}

fn describe_call(call: &ToolInvocation) -> String {
    let args = call.arguments.to_string();
    let args = if args.chars().count() > 200 {
        let cut: String = args.chars().take(200).collect();
        format!("{cut}…")
    } else {
        args
    };
    format!("{}({args})", call.name)
}

/// Scan the tail of a context for background-prompt sentinels.
fn has_background_sentinels(messages: &[Message]) -> bool {
    messages.iter().rev().take(6).any(|m| {
        m.as_text().map_or(false, |t| {
            let t = t.trim_start();
            BACKGROUND_SENTINELS.iter().any(|s| t.starts_with(s))
                || t.starts_with(HEARTBEAT_PREAMBLE)
        })
    })
}

/// Mine a `user_fact` from simple self-introduction patterns.
pub fn mine_user_fact(text: &str) -> Option<String> {
    use std::sync::OnceLock;
    static NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    static CALL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let name_re = NAME_RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\bmy name is ([A-Za-z][A-Za-z'\-]{1,30})").unwrap()
    });
    let call_re = CALL_RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\bcall me ([A-Za-z][A-Za-z'\-]{1,30})").unwrap()
    });
    if let Some(c) = name_re.captures(text) {
        return Some(format!("The user's name is {}.", &c[1]));
    }
    if let Some(c) = call_re.captures(text) {
        return Some(format!("The user prefers to be called {}.", &c[1]));
    }
    None
}

/// Map router failures to single-sentence user-visible text.
fn friendly_router_error(e: &RouterError) -> String {
    match e {
        RouterError::NoChain(role) => format!(
            "No model chain is configured for '{role}'. Add one under models.roles in your config."
        ),
        RouterError::AllFailed { attempts } => {
            let joined = attempts.join("\n");
            if joined.contains("no credentials") {
                "No API key is configured for the model provider. \
                 Add one to your config or environment."
                    .to_string()
            } else if joined.contains("ECONNREFUSED")
                || joined.contains("fetch failed")
                || joined.contains("transport error")
                || joined.contains("error sending request")
            {
                "I can't reach the model provider. \
                 Check that the endpoint is running and reachable."
                    .to_string()
            } else {
                "All models failed. Please check provider status and try again.".to_string()
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
