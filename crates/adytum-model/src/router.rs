// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model router: maps roles/aliases to ordered model chains and executes
//! with fallback, cooldown, and token accounting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use adytum_config::ModelsConfig;

use crate::{
    catalog::{ApiFamily, Catalog, ModelCatalogEntry},
    credentials::{AuthMode, CredentialResolver, ResolvedAuth},
    provider::{ChunkStream, ProviderAdapter},
    AnthropicAdapter, AssistantReply, ChatOptions, MockAdapter, OpenAiCompatAdapter,
    ProviderError, Usage,
};

/// Cooldown ladder indexed by consecutive-failure count (capped at the last
/// entry): 30 s, 1 m, 5 m, 15 m, 60 m.
pub const COOLDOWN_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(900),
    Duration::from_secs(3600),
];

/// Cooldown duration for the given consecutive-failure index (1-based).
pub fn cooldown_for(failure_index: u32) -> Duration {
    let idx = (failure_index.saturating_sub(1) as usize).min(COOLDOWN_SCHEDULE.len() - 1);
    COOLDOWN_SCHEDULE[idx]
}

#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// No task override, role chain, or legacy entry resolves a chain.
    #[error("no model chain resolvable for '{0}'")]
    NoChain(String),
    /// Every candidate in the chain failed; one line per attempt.
    #[error("all models failed:\n{}", attempts.join("\n"))]
    AllFailed { attempts: Vec<String> },
}

/// Successful router reply.
#[derive(Debug, Clone)]
pub struct RouterReply {
    pub model_id: String,
    pub message: AssistantReply,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Ok,
    RateLimited,
    QuotaExceeded,
}

/// Observable per-model state for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRuntimeStatus {
    pub state: RuntimeState,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub reset_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelUsage {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost: f64,
}

/// Builds the adapter for a catalog entry.  Injected so tests can substitute
/// scripted adapters for any model id.
pub trait AdapterFactory: Send + Sync {
    fn adapter_for(
        &self,
        entry: &ModelCatalogEntry,
        auth: &ResolvedAuth,
    ) -> Arc<dyn ProviderAdapter>;
}

/// Production factory: one shared HTTP client, family-dispatched adapters.
pub struct HttpAdapterFactory {
    client: reqwest::Client,
}

impl HttpAdapterFactory {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
        }
    }
}

impl Default for HttpAdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

const ANTHROPIC_DEFAULT_URL: &str = "https://api.anthropic.com";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

impl AdapterFactory for HttpAdapterFactory {
    fn adapter_for(
        &self,
        entry: &ModelCatalogEntry,
        auth: &ResolvedAuth,
    ) -> Arc<dyn ProviderAdapter> {
        match entry.api {
            ApiFamily::Anthropic => Arc::new(AnthropicAdapter::new(
                entry.base_url.as_deref().unwrap_or(ANTHROPIC_DEFAULT_URL),
                auth.clone(),
                self.client.clone(),
            )),
            ApiFamily::Openai => Arc::new(OpenAiCompatAdapter::new(
                entry.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_URL),
                auth.clone(),
                self.client.clone(),
            )),
            ApiFamily::Mock => Arc::new(MockAdapter),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Chains {
    roles: HashMap<String, Vec<String>>,
    tasks: HashMap<String, Vec<String>>,
    legacy: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct ModelRuntime {
    consecutive_failures: u32,
    status: ModelRuntimeStatus,
}

pub struct ModelRouter {
    chains: RwLock<Chains>,
    catalog: Catalog,
    credentials: Arc<CredentialResolver>,
    factory: Box<dyn AdapterFactory>,
    runtime: Mutex<HashMap<String, ModelRuntime>>,
    usage: Mutex<HashMap<String, ModelUsage>>,
}

impl ModelRouter {
    pub fn new(
        models: &ModelsConfig,
        catalog: Catalog,
        credentials: Arc<CredentialResolver>,
        factory: Box<dyn AdapterFactory>,
    ) -> Self {
        Self {
            chains: RwLock::new(Chains {
                roles: models.roles.clone(),
                tasks: models.tasks.clone(),
                legacy: models.legacy.clone(),
            }),
            catalog,
            credentials,
            factory,
            runtime: Mutex::new(HashMap::new()),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Swap the routing table for one role at runtime.
    pub fn update_chains(&self, role: impl Into<String>, chain: Vec<String>) {
        let mut chains = self.chains.write().expect("chain lock poisoned");
        chains.roles.insert(role.into(), chain);
    }

    /// Snapshot of the role → chain table (dashboard `/api/config/roles`).
    pub fn role_chains(&self) -> HashMap<String, Vec<String>> {
        self.chains.read().expect("chain lock poisoned").roles.clone()
    }

    /// Resolve the ordered candidate chain for a role or task name.
    /// Precedence: task override > role chain > legacy single-model map.
    fn resolve_chain(&self, role_or_task: &str) -> Result<Vec<String>, RouterError> {
        let chains = self.chains.read().expect("chain lock poisoned");
        if let Some(chain) = chains.tasks.get(role_or_task) {
            if !chain.is_empty() {
                return Ok(chain.clone());
            }
        }
        if let Some(chain) = chains.roles.get(role_or_task) {
            if !chain.is_empty() {
                return Ok(chain.clone());
            }
        }
        if let Some(single) = chains.legacy.get(role_or_task) {
            return Ok(vec![single.clone()]);
        }
        Err(RouterError::NoChain(role_or_task.to_string()))
    }

    fn in_cooldown(&self, model_id: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let runtime = self.runtime.lock().expect("runtime lock poisoned");
        runtime
            .get(model_id)
            .and_then(|r| r.status.cooldown_until)
            .filter(|until| *until > now)
    }

    fn set_cooldown(&self, model_id: &str, err: &ProviderError) {
        let now = Utc::now();
        let mut runtime = self.runtime.lock().expect("runtime lock poisoned");
        let entry = runtime.entry(model_id.to_string()).or_insert(ModelRuntime {
            consecutive_failures: 0,
            status: ModelRuntimeStatus {
                state: RuntimeState::Ok,
                cooldown_until: None,
                reset_at: None,
                message: None,
                updated_at: now,
            },
        });
        entry.consecutive_failures += 1;
        let until = now
            + chrono::Duration::from_std(cooldown_for(entry.consecutive_failures))
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        entry.status = ModelRuntimeStatus {
            state: match err {
                ProviderError::QuotaExceeded(_) => RuntimeState::QuotaExceeded,
                _ => RuntimeState::RateLimited,
            },
            cooldown_until: Some(until),
            reset_at: Some(until),
            message: Some(err.to_string()),
            updated_at: now,
        };
        warn!(model = model_id, failures = entry.consecutive_failures, until = %until, "model cooling down");
    }

    fn clear_failures(&self, model_id: &str) {
        let mut runtime = self.runtime.lock().expect("runtime lock poisoned");
        if let Some(entry) = runtime.get_mut(model_id) {
            entry.consecutive_failures = 0;
            entry.status.state = RuntimeState::Ok;
            entry.status.cooldown_until = None;
            entry.status.message = None;
            entry.status.updated_at = Utc::now();
        }
    }

    fn record_usage(&self, entry: &ModelCatalogEntry, usage: Usage) {
        let mut ledger = self.usage.lock().expect("usage lock poisoned");
        let u = ledger.entry(entry.qualified_id()).or_default();
        u.calls += 1;
        u.prompt_tokens += usage.prompt_tokens as u64;
        u.completion_tokens += usage.completion_tokens as u64;
        u.estimated_cost += entry.estimated_cost(usage.prompt_tokens, usage.completion_tokens);
    }

    fn auth_mode_for(provider: &str) -> AuthMode {
        match provider {
            "ollama" | "lmstudio" | "vllm" | "mock" => AuthMode::None,
            _ => AuthMode::ApiKey,
        }
    }

    /// Pick a model for `role_or_task` and execute with fallback.
    pub async fn chat(
        &self,
        role_or_task: &str,
        messages: &[crate::Message],
        opts: &ChatOptions,
    ) -> Result<RouterReply, RouterError> {
        let chain = self.resolve_chain(role_or_task)?;
        let now = Utc::now();
        let mut attempts: Vec<String> = Vec::new();

        for model_id in &chain {
            if let Some(until) = self.in_cooldown(model_id, now) {
                attempts.push(format!("[{model_id}] cooling down until {until}"));
                continue;
            }
            let entry = match self.catalog.lookup(model_id) {
                Some(e) => e.clone(),
                None => {
                    attempts.push(format!("[{model_id}] not in catalog"));
                    continue;
                }
            };
            let mode = Self::auth_mode_for(&entry.provider);
            let auth = match self.credentials.resolve(&entry.provider, None, Some(mode)) {
                Some(a) => a,
                None => {
                    attempts.push(format!(
                        "[{model_id}] no credentials for provider '{}'",
                        entry.provider
                    ));
                    continue;
                }
            };

            let adapter = self.factory.adapter_for(&entry, &auth);
            debug!(model = %model_id, role = role_or_task, "routing chat");
            match adapter.chat(&entry.id, messages, opts).await {
                Ok(outcome) => {
                    self.clear_failures(model_id);
                    self.record_usage(&entry, outcome.usage);
                    return Ok(RouterReply {
                        model_id: model_id.clone(),
                        message: outcome.message,
                        usage: outcome.usage,
                    });
                }
                Err(e) => {
                    attempts.push(format!("[{model_id}] {e}"));
                    if e.triggers_cooldown() {
                        self.set_cooldown(model_id, &e);
                    } else if matches!(e, ProviderError::Auth(_)) {
                        self.credentials.mark_failed(&entry.provider);
                    }
                    // Transport errors: no cooldown, keep trying the chain.
                }
            }
        }

        Err(RouterError::AllFailed { attempts })
    }

    /// Stream deltas for `role_or_task`.
    ///
    /// Candidate selection matches [`chat`]; the chosen adapter's
    /// `chat_stream` is used, which degrades to one non-streaming call
    /// yielded as a single chunk for adapters without native streaming.
    pub async fn chat_stream(
        &self,
        role_or_task: &str,
        messages: &[crate::Message],
        opts: &ChatOptions,
    ) -> Result<(String, ChunkStream), RouterError> {
        let chain = self.resolve_chain(role_or_task)?;
        let now = Utc::now();
        let mut attempts: Vec<String> = Vec::new();

        for model_id in &chain {
            if let Some(until) = self.in_cooldown(model_id, now) {
                attempts.push(format!("[{model_id}] cooling down until {until}"));
                continue;
            }
            let entry = match self.catalog.lookup(model_id) {
                Some(e) => e.clone(),
                None => {
                    attempts.push(format!("[{model_id}] not in catalog"));
                    continue;
                }
            };
            let mode = Self::auth_mode_for(&entry.provider);
            let auth = match self.credentials.resolve(&entry.provider, None, Some(mode)) {
                Some(a) => a,
                None => {
                    attempts.push(format!(
                        "[{model_id}] no credentials for provider '{}'",
                        entry.provider
                    ));
                    continue;
                }
            };
            let adapter = self.factory.adapter_for(&entry, &auth);
            match adapter.chat_stream(&entry.id, messages, opts).await {
                Ok(stream) => return Ok((model_id.clone(), stream)),
                Err(e) => {
                    attempts.push(format!("[{model_id}] {e}"));
                    if e.triggers_cooldown() {
                        self.set_cooldown(model_id, &e);
                    } else if matches!(e, ProviderError::Auth(_)) {
                        self.credentials.mark_failed(&entry.provider);
                    }
                }
            }
        }
        Err(RouterError::AllFailed { attempts })
    }

    /// Observable per-model runtime state (`/api/models/runtime-status`).
    pub fn runtime_status(&self) -> HashMap<String, ModelRuntimeStatus> {
        self.runtime
            .lock()
            .expect("runtime lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.status.clone()))
            .collect()
    }

    /// Per-model token/cost totals.
    pub fn usage_totals(&self) -> HashMap<String, ModelUsage> {
        self.usage.lock().expect("usage lock poisoned").clone()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
