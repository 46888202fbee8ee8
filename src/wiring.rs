// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Command implementations: bootstrapping, the long-running `start`
//! composition root, and the maintenance verbs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use adytum_agent::{
    AgentRuntime, AuditLog, RunOverrides, RuntimeConfig, RuntimeRegistry, SpawnSubAgentTool,
    SubAgentSpawner, TraceStatus,
};
use adytum_config::Config;
use adytum_gateway::{ApprovalBroker, GatewayState};
use adytum_hierarchy::{AgentRegistry, BirthParams, HierarchyStore};
use adytum_memory::{MemoryStore, SqliteMemoryStore};
use adytum_model::{
    ApiFamily, Catalog, CredentialResolver, HttpAdapterFactory, ModelCatalogEntry, ModelRouter,
};
use adytum_scheduler::{CronScheduler, CronStore, JobExecutor};
use adytum_skills::SkillLoader;
use adytum_tools::{
    ApprovalHandler, HttpFetchTool, ListDirTool, ReadFileTool, SecurityPolicy, ShellExecuteTool,
    ShellPolicy, ToolRegistry, WriteFileTool,
};

use crate::cli::{Cli, ModelsCommands, SkillCommands};

const DEFAULT_SOUL: &str = "You are the resident overseer of this workspace: a careful, \
honest assistant that favours small verifiable steps over sweeping claims.\n";

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    adytum_config::load(cli.config.as_deref())
}

// ─── init / reset ─────────────────────────────────────────────────────────────

pub fn cmd_init(cli: &Cli, reset: bool) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    if reset {
        wipe_data(&config)?;
    }
    let paths = config.paths();
    for dir in [
        paths.sqlite_db.parent().unwrap(),
        paths.agents_json.parent().unwrap(),
        &paths.snapshots_dir,
        &paths.skills_dir,
    ] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    if !config.soul.path.exists() {
        std::fs::write(&config.soul.path, DEFAULT_SOUL)
            .with_context(|| format!("writing {}", config.soul.path.display()))?;
        info!(path = %config.soul.path.display(), "wrote default soul");
    }

    let hierarchy = AgentRegistry::open(HierarchyStore::at(&paths.agents_json))?;
    if !hierarchy.get_active().iter().any(|a| a.tier == 1) {
        let root = hierarchy.birth(BirthParams {
            name: "Overseer".into(),
            tier: 1,
            role: "root coordinator of the agent hierarchy".into(),
            ..Default::default()
        })?;
        info!(agent = %root.id, "root agent born");
    }
    println!("workspace initialised under {}", config.data_dir.display());
    Ok(())
}

pub fn cmd_reset(cli: &Cli, yes: bool) -> anyhow::Result<()> {
    anyhow::ensure!(yes, "refusing to wipe state without --yes");
    let config = load_config(cli)?;
    wipe_data(&config)?;
    println!("workspace state removed from {}", config.data_dir.display());
    Ok(())
}

fn wipe_data(config: &Config) -> anyhow::Result<()> {
    if config.data_dir.exists() {
        std::fs::remove_dir_all(&config.data_dir)
            .with_context(|| format!("removing {}", config.data_dir.display()))?;
    }
    Ok(())
}

// ─── start ────────────────────────────────────────────────────────────────────

/// Drives agent turns for the cron scheduler.
struct RuntimeJobExecutor {
    runtime: Arc<AgentRuntime>,
}

#[async_trait]
impl JobExecutor for RuntimeJobExecutor {
    async fn run(
        &self,
        task: &str,
        session_id: &str,
        agent_id: Option<&str>,
    ) -> anyhow::Result<String> {
        let outcome = self
            .runtime
            .run(
                task,
                session_id,
                RunOverrides {
                    agent_id: agent_id.map(|s| s.to_string()),
                    ..Default::default()
                },
            )
            .await;
        match outcome.trace.status {
            TraceStatus::Completed => Ok(outcome.response),
            _ => anyhow::bail!("{}", outcome.response),
        }
    }
}

pub async fn cmd_start(cli: &Cli, no_browser: bool) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let paths = config.paths();

    // Model layer: catalog + credentials + router.
    let catalog = Catalog::with_overrides(&paths.models_json);
    let credentials = Arc::new(CredentialResolver::new(
        config.providers.clone(),
        config.profile.clone(),
    ));
    credentials.load_store(&config.data_dir.join("credentials.json"));
    let router = Arc::new(ModelRouter::new(
        &config.models,
        catalog,
        credentials,
        Box::new(HttpAdapterFactory::new()),
    ));

    // Tools with the path whitelist and shell policy.
    let security = Arc::new(SecurityPolicy::load(&paths.security_json));
    let shell_policy = Arc::new(ShellPolicy::from_config(&config.tools));
    let tools = Arc::new(ToolRegistry::new());
    tools.register(ReadFileTool {
        security: Arc::clone(&security),
    });
    tools.register(WriteFileTool {
        security: Arc::clone(&security),
    });
    tools.register(ListDirTool {
        security: Arc::clone(&security),
    });
    tools.register(ShellExecuteTool {
        timeout_secs: config.tools.shell_timeout_secs,
        policy: shell_policy,
    });
    tools.register(HttpFetchTool::new());

    let memory: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::open(&paths.sqlite_db)?);
    let hierarchy = Arc::new(AgentRegistry::open(HierarchyStore::at(&paths.agents_json))?);
    let root = hierarchy
        .get_active()
        .into_iter()
        .find(|a| a.tier == 1)
        .context("no root agent; run `adytum init` first")?;

    let sessions = Arc::new(RuntimeRegistry::new());
    let audit = Arc::new(AuditLog::new());
    let broker = Arc::new(ApprovalBroker::new(Duration::from_secs(120)));

    let soul = std::fs::read_to_string(&config.soul.path).unwrap_or_else(|_| {
        warn!(path = %config.soul.path.display(), "soul file missing; using default");
        DEFAULT_SOUL.to_string()
    });

    let runtime = Arc::new(AgentRuntime::new(
        RuntimeConfig {
            agent_name: root.name.clone(),
            role: config.models.default_role.clone(),
            soul,
            agent: config.agent.clone(),
        },
        Arc::clone(&router),
        Arc::clone(&tools),
        memory,
        Arc::clone(&broker) as Arc<dyn ApprovalHandler>,
        Arc::clone(&audit),
        Arc::clone(&sessions),
    ));

    // Sub-agent spawning is itself a tool.
    let spawner = Arc::new(SubAgentSpawner::new(
        Arc::clone(&runtime),
        Arc::clone(&hierarchy),
    ));
    tools.register(SpawnSubAgentTool::new(spawner));

    // Skills: discover, load, and surface in the system prompt.
    let skills = SkillLoader::new(&paths.skills_dir, Arc::clone(&tools));
    let loaded = skills.load_all();
    info!(count = loaded.len(), "skills loaded");
    runtime.set_skills(skills.prompt_labels()).await;

    // Scheduler drives the same runtime on timers.
    let scheduler = CronScheduler::load(
        CronStore::at(&paths.cron_json),
        Arc::new(RuntimeJobExecutor {
            runtime: Arc::clone(&runtime),
        }),
        Arc::clone(&sessions),
        config.cron.clone(),
    )?;
    scheduler.start();

    let port = config.gateway.effective_port();
    let dashboard = format!("http://127.0.0.1:{}", config.gateway.effective_dashboard_port());
    if !no_browser && config.gateway.open_browser {
        // Best effort; a headless host simply logs the URL.
        let _ = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("xdg-open {dashboard} >/dev/null 2>&1"))
            .spawn();
    }
    println!("gateway on http://127.0.0.1:{port}  dashboard at {dashboard}");

    let state = Arc::new(GatewayState::new(runtime, router, broker));
    let serve = adytum_gateway::serve(state, port);
    tokio::select! {
        result = serve => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            scheduler.shutdown();
        }
    }
    Ok(())
}

// ─── update / status ──────────────────────────────────────────────────────────

pub fn cmd_update() -> anyhow::Result<()> {
    println!("updating adytum via cargo install…");
    let status = std::process::Command::new("cargo")
        .args(["install", "adytum", "--force"])
        .status()
        .context("running cargo install")?;
    anyhow::ensure!(status.success(), "update failed with {status}");
    Ok(())
}

pub fn cmd_status(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let paths = config.paths();

    let hierarchy = AgentRegistry::open(HierarchyStore::at(&paths.agents_json))?;
    let active = hierarchy.get_active();
    let graveyard = hierarchy.get_graveyard();
    let jobs = CronStore::at(&paths.cron_json).load()?;
    let skills = adytum_skills::discover_skills(&paths.skills_dir);

    println!("data dir      {}", config.data_dir.display());
    println!("gateway port  {}", config.gateway.effective_port());
    println!(
        "agents        {} active, {} in the graveyard",
        active.len(),
        graveyard.len()
    );
    for a in &active {
        println!("  - {} (tier {}, {})", a.name, a.tier, a.role);
    }
    println!(
        "cron jobs     {} ({} enabled)",
        jobs.len(),
        jobs.iter().filter(|j| j.enabled).count()
    );
    println!("skills        {}", skills.len());
    for s in &skills {
        println!("  - {}: {}", s.manifest.id, s.manifest.description);
    }
    Ok(())
}

// ─── skill ────────────────────────────────────────────────────────────────────

pub async fn cmd_skill(cli: &Cli, command: &SkillCommands) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let paths = config.paths();
    let loader = SkillLoader::new(&paths.skills_dir, Arc::new(ToolRegistry::new()));

    match command {
        SkillCommands::List => {
            let discovered = loader.discover();
            if discovered.is_empty() {
                println!("no skills under {}", paths.skills_dir.display());
            }
            for s in discovered {
                println!("{}: {}", s.manifest.id, s.manifest.description);
            }
        }
        SkillCommands::Check { id } => {
            let check = loader
                .check(id)
                .with_context(|| format!("no skill package '{id}'"))?;
            if check.missing_env.is_empty() {
                println!("{id}: environment satisfied");
            } else {
                println!("{id}: missing environment: {}", check.missing_env.join(", "));
            }
            if !check.has_implementation {
                println!("{id}: no registered implementation in this build");
            }
        }
        SkillCommands::Install { id } => {
            let skill = loader
                .discover()
                .into_iter()
                .find(|s| s.manifest.id == *id)
                .with_context(|| format!("no skill package '{id}'"))?;
            for step in &skill.manifest.install {
                println!("running: {step}");
                let status = tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(step)
                    .current_dir(&skill.dir)
                    .status()
                    .await
                    .with_context(|| format!("running '{step}'"))?;
                anyhow::ensure!(status.success(), "install step failed: {step}");
            }
            println!("{id} installed");
        }
        SkillCommands::Remove { id } => {
            let dir = paths.skills_dir.join(id);
            anyhow::ensure!(dir.is_dir(), "no skill package '{id}'");
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("removing {}", dir.display()))?;
            println!("{id} removed");
        }
    }
    Ok(())
}

// ─── models ───────────────────────────────────────────────────────────────────

pub async fn cmd_models(cli: &Cli, command: &ModelsCommands) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let paths = config.paths();

    match command {
        ModelsCommands::List => {
            let catalog = Catalog::with_overrides(&paths.models_json);
            for e in catalog.all() {
                println!(
                    "{:40} {:>8} ctx  {:>7} out  {}",
                    e.qualified_id(),
                    e.context_window,
                    e.max_output_tokens,
                    e.description
                );
            }
        }
        ModelsCommands::Scan => {
            for (provider, base) in [
                ("ollama", "http://localhost:11434/v1"),
                ("lmstudio", "http://localhost:1234/v1"),
                ("vllm", "http://127.0.0.1:8000/v1"),
            ] {
                let reachable = probe_local(base).await;
                println!(
                    "{provider:10} {base}  {}",
                    if reachable { "up" } else { "down" }
                );
            }
        }
        ModelsCommands::Add { model } => {
            let (provider, id) = model
                .split_once('/')
                .context("expected provider/model form")?;
            let entry = ModelCatalogEntry {
                id: id.to_string(),
                name: id.to_string(),
                provider: provider.to_string(),
                api: if provider == "anthropic" {
                    ApiFamily::Anthropic
                } else {
                    ApiFamily::Openai
                },
                base_url: None,
                context_window: 32_768,
                max_output_tokens: 8_192,
                input_cost_per_mtok: 0.0,
                output_cost_per_mtok: 0.0,
                description: "user-added model".into(),
            };
            let mut overrides = read_overrides(&paths.models_json)?;
            overrides.retain(|e| e.qualified_id() != entry.qualified_id());
            overrides.push(entry);
            write_overrides(&paths.models_json, &overrides)?;
            println!("{model} added to {}", paths.models_json.display());
        }
        ModelsCommands::Remove { id } => {
            let mut overrides = read_overrides(&paths.models_json)?;
            let before = overrides.len();
            overrides.retain(|e| e.qualified_id() != *id);
            anyhow::ensure!(overrides.len() != before, "no user entry '{id}'");
            write_overrides(&paths.models_json, &overrides)?;
            println!("{id} removed");
        }
    }
    Ok(())
}

fn read_overrides(path: &Path) -> anyhow::Result<Vec<ModelCatalogEntry>> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).context("parsing models.json"),
        Err(_) => Ok(Vec::new()),
    }
}

fn write_overrides(path: &Path, entries: &[ModelCatalogEntry]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(entries)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Health probe for a local OpenAI-compatible server (2 s budget).
async fn probe_local(base_url: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(c) => c,
        Err(_) => return false,
    };
    client
        .get(format!("{base_url}/models"))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}
