// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless the user
/// explicitly disables them need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Workspace data root.  All persisted state lives underneath it; see
    /// [`Config::paths`] for the derived layout.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub models: ModelsConfig,
    /// Named provider credential hints.
    ///
    /// ```yaml
    /// providers:
    ///   anthropic:
    ///     api_key_env: MY_ANTHROPIC_KEY
    ///   openrouter:
    ///     api_key: sk-or-...        # discouraged in committed files
    /// ```
    #[serde(default)]
    pub providers: HashMap<String, ProviderHint>,
    /// Profile label selecting which stored credentials are preferred.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub soul: SoulConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_profile() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway listen port.  The `GATEWAY_PORT` environment variable wins
    /// over the config file value.
    pub port: u16,
    /// Dashboard dev-server port (`PORT` env var wins).
    pub dashboard_port: u16,
    /// Open the dashboard in a browser after `start`.
    #[serde(default = "default_true")]
    pub open_browser: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            dashboard_port: 3000,
            open_browser: true,
        }
    }
}

impl GatewayConfig {
    /// Effective gateway port after applying the `GATEWAY_PORT` override.
    pub fn effective_port(&self) -> u16 {
        std::env::var("GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.port)
    }

    /// Effective dashboard port after applying the `PORT` override.
    pub fn effective_dashboard_port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.dashboard_port)
    }
}

/// Role/task → model-chain routing tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Role → ordered chain of fully-qualified model ids
    /// (e.g. `thinking: ["anthropic/claude-opus-4-5", "openai/gpt-4o"]`).
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
    /// Task-name overrides, consulted before the role chains.
    #[serde(default)]
    pub tasks: HashMap<String, Vec<String>>,
    /// Legacy single-model map kept for configs written before chains
    /// existed.  Only consulted when no chain resolves.
    #[serde(default)]
    pub legacy: HashMap<String, String>,
    /// Role used when the caller does not name one.
    pub default_role: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            roles: HashMap::new(),
            tasks: HashMap::new(),
            legacy: HashMap::new(),
            default_role: "thinking".into(),
        }
    }
}

/// Credential hint for one provider.  Exactly one of `api_key` /
/// `api_key_env` is normally set; a literal wins when both are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderHint {
    /// Explicit secret; prefer `api_key_env` in version-controlled files.
    pub api_key: Option<String>,
    /// Environment variable holding the secret (read at resolve time).
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum think → tool → observe iterations per turn.
    pub max_iterations: u32,
    /// Sampling temperature forwarded to the router.
    pub temperature: f32,
    /// Soft token budget for a session's context before compaction runs.
    pub context_soft_limit: usize,
    /// Number of trailing messages compaction keeps byte-identical.
    pub compaction_keep_trailing: usize,
    /// Mine `user_fact` memories from simple patterns in user messages.
    #[serde(default = "default_true")]
    pub mine_user_facts: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            temperature: 0.7,
            context_soft_limit: 24_000,
            compaction_keep_trailing: 8,
            mine_user_facts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoulConfig {
    /// Path to the soul preamble file, relative to the workspace root.
    pub path: PathBuf,
    /// Authoritative gate for the background soul-evolution step.
    #[serde(default)]
    pub auto_update: bool,
}

impl Default for SoulConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("SOUL.md"),
            auto_update: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Per-job execution timeout unless the job overrides it.
    pub default_timeout_ms: u64,
    /// Spin-loop guard: a job never refires within this gap.
    pub min_refire_gap_ms: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 600_000,
            min_refire_gap_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Timeout for `shell_execute`, in seconds.
    pub shell_timeout_secs: u64,
    /// Glob patterns for shell commands that run without approval.
    #[serde(default)]
    pub auto_approve_patterns: Vec<String>,
    /// Glob patterns for shell commands that are always denied.
    #[serde(default)]
    pub deny_patterns: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 120,
            auto_approve_patterns: vec!["ls *".into(), "cat *".into(), "ls".into()],
            deny_patterns: vec!["rm -rf /*".into()],
        }
    }
}

/// Filesystem layout derived from `data_dir`.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub sqlite_db: PathBuf,
    pub agents_json: PathBuf,
    pub cron_json: PathBuf,
    pub security_json: PathBuf,
    pub models_json: PathBuf,
    pub snapshots_dir: PathBuf,
    pub evolution_md: PathBuf,
    pub skills_dir: PathBuf,
}

impl Config {
    /// Derived on-disk layout under `data_dir`.
    pub fn paths(&self) -> DataPaths {
        let d = &self.data_dir;
        DataPaths {
            sqlite_db: d.join("sqlite").join("adytum.db"),
            agents_json: d.join("hierarchy").join("agents.json"),
            cron_json: d.join("cron.json"),
            security_json: d.join("security.json"),
            models_json: d.join("models.json"),
            snapshots_dir: d.join("memories").join("snapshots"),
            evolution_md: d.join("EVOLUTION.md"),
            skills_dir: d.join("skills"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_thinking_role() {
        let cfg = Config::default();
        assert_eq!(cfg.models.default_role, "thinking");
    }

    #[test]
    fn default_agent_limits_are_sane() {
        let a = AgentConfig::default();
        assert!(a.max_iterations >= 1);
        assert_eq!(a.compaction_keep_trailing, 8);
        assert!(a.context_soft_limit > 1000);
    }

    #[test]
    fn paths_derive_from_data_dir() {
        let cfg = Config {
            data_dir: PathBuf::from("/var/adytum/data"),
            ..Config::default()
        };
        let p = cfg.paths();
        assert_eq!(p.sqlite_db, PathBuf::from("/var/adytum/data/sqlite/adytum.db"));
        assert_eq!(p.agents_json, PathBuf::from("/var/adytum/data/hierarchy/agents.json"));
        assert_eq!(p.cron_json, PathBuf::from("/var/adytum/data/cron.json"));
    }

    #[test]
    fn gateway_port_env_override_wins() {
        let g = GatewayConfig {
            port: 8787,
            ..GatewayConfig::default()
        };
        std::env::set_var("GATEWAY_PORT", "9999");
        assert_eq!(g.effective_port(), 9999);
        std::env::remove_var("GATEWAY_PORT");
        assert_eq!(g.effective_port(), 8787);
    }

    #[test]
    fn provider_hint_deserialises_env_form() {
        let h: ProviderHint =
            serde_yaml::from_str("api_key_env: MY_KEY").unwrap();
        assert_eq!(h.api_key_env.as_deref(), Some("MY_KEY"));
        assert!(h.api_key.is_none());
    }

    #[test]
    fn cron_defaults() {
        let c = CronConfig::default();
        assert_eq!(c.default_timeout_ms, 600_000);
        assert_eq!(c.min_refire_gap_ms, 2_000);
    }
}
