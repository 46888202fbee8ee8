// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Skill loading: per-skill API objects, secret injection, and tracked
//! tool registration so hot reloads can unregister cleanly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{info, warn};

use adytum_tools::{Tool, ToolRegistry};

use crate::manifest::{discover_skills, DiscoveredSkill, SkillManifest};

/// The sandboxed surface a skill sees during registration.
///
/// Secrets flow in via [`SkillLoader::set_skill_secrets`] and are exposed
/// to the skill only through its own API object, never globally.
pub struct SkillApi {
    skill_id: String,
    registry: Arc<ToolRegistry>,
    registered: Vec<String>,
    secrets: HashMap<String, String>,
    /// Free-form per-skill configuration (from the manifest directory).
    pub config: Value,
    /// INSTRUCTIONS.md body, when the package ships one.
    pub instructions: Option<String>,
}

impl SkillApi {
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.registry.register_arc(tool);
        self.registered.push(name);
    }

    /// Look up an injected secret, falling back to the process environment.
    pub fn secret(&self, key: &str) -> Option<String> {
        if let Some(v) = self.secrets.get(key) {
            return Some(v.clone());
        }
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    pub fn log(&self, message: &str) {
        info!(skill = %self.skill_id, "{message}");
    }
}

/// A compiled-in skill body.  The manifest on disk gates whether it loads;
/// this trait is the registration contract.
pub trait Skill: Send + Sync {
    fn id(&self) -> &str;
    fn register(&self, api: &mut SkillApi) -> anyhow::Result<()>;
}

struct LoadedSkill {
    manifest: SkillManifest,
    tool_names: Vec<String>,
}

/// Result of `skill check <id>`.
#[derive(Debug, Clone)]
pub struct SkillCheck {
    pub id: String,
    pub has_implementation: bool,
    pub missing_env: Vec<String>,
}

pub struct SkillLoader {
    skills_dir: PathBuf,
    registry: Arc<ToolRegistry>,
    implementations: Mutex<HashMap<String, Arc<dyn Skill>>>,
    secrets: Mutex<HashMap<String, HashMap<String, String>>>,
    loaded: Mutex<HashMap<String, LoadedSkill>>,
}

impl SkillLoader {
    pub fn new(skills_dir: impl Into<PathBuf>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            registry,
            implementations: Mutex::new(HashMap::new()),
            secrets: Mutex::new(HashMap::new()),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Register a compiled-in skill body.  Loading still requires a
    /// manifest on disk with the same id.
    pub fn register_implementation(&self, skill: Arc<dyn Skill>) {
        self.implementations
            .lock()
            .expect("implementation lock poisoned")
            .insert(skill.id().to_string(), skill);
    }

    /// Inject secrets for one skill.  They reach the skill only through
    /// its [`SkillApi`].
    pub fn set_skill_secrets(&self, id: &str, secrets: HashMap<String, String>) {
        self.secrets
            .lock()
            .expect("secret lock poisoned")
            .insert(id.to_string(), secrets);
    }

    /// Discovered manifests, whether loadable or not.
    pub fn discover(&self) -> Vec<DiscoveredSkill> {
        discover_skills(&self.skills_dir)
    }

    fn env_satisfied(&self, id: &str, manifest: &SkillManifest) -> Vec<String> {
        let secrets = self.secrets.lock().expect("secret lock poisoned");
        let skill_secrets = secrets.get(id);
        manifest
            .required_env
            .iter()
            .filter(|key| {
                let injected = skill_secrets.map(|s| s.contains_key(*key)).unwrap_or(false);
                let in_env = std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false);
                !(injected || in_env)
            })
            .cloned()
            .collect()
    }

    /// Load every discovered skill whose requirements are met and whose
    /// implementation is registered.  Returns the loaded ids.
    pub fn load_all(&self) -> Vec<String> {
        let mut loaded_ids = Vec::new();
        for discovered in self.discover() {
            let id = discovered.manifest.id.clone();
            if self
                .loaded
                .lock()
                .expect("loaded lock poisoned")
                .contains_key(&id)
            {
                continue;
            }
            let missing = self.env_satisfied(&id, &discovered.manifest);
            if !missing.is_empty() {
                warn!(skill = %id, ?missing, "skill skipped: required environment unset");
                continue;
            }
            let implementation = {
                let impls = self
                    .implementations
                    .lock()
                    .expect("implementation lock poisoned");
                impls.get(&id).cloned()
            };
            let Some(implementation) = implementation else {
                warn!(skill = %id, "skill skipped: no registered implementation");
                continue;
            };

            let mut api = SkillApi {
                skill_id: id.clone(),
                registry: Arc::clone(&self.registry),
                registered: Vec::new(),
                secrets: self
                    .secrets
                    .lock()
                    .expect("secret lock poisoned")
                    .get(&id)
                    .cloned()
                    .unwrap_or_default(),
                config: Value::Null,
                instructions: discovered.instructions.clone(),
            };
            match implementation.register(&mut api) {
                Ok(()) => {
                    info!(skill = %id, tools = api.registered.len(), "skill loaded");
                    self.loaded.lock().expect("loaded lock poisoned").insert(
                        id.clone(),
                        LoadedSkill {
                            manifest: discovered.manifest,
                            tool_names: api.registered,
                        },
                    );
                    loaded_ids.push(id);
                }
                Err(e) => {
                    // Roll back anything the failed register managed to add.
                    self.registry.unregister_many(&api.registered);
                    warn!(skill = %id, error = %e, "skill registration failed");
                }
            }
        }
        loaded_ids
    }

    /// Hot reload: unregister every loaded skill's tools, then re-discover
    /// and load from scratch.
    pub fn reload(&self) -> Vec<String> {
        {
            let mut loaded = self.loaded.lock().expect("loaded lock poisoned");
            for (_, skill) in loaded.drain() {
                self.registry.unregister_many(&skill.tool_names);
            }
        }
        self.load_all()
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .loaded
            .lock()
            .expect("loaded lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// `description` lines for the system prompt's skill list.
    pub fn prompt_labels(&self) -> Vec<String> {
        let loaded = self.loaded.lock().expect("loaded lock poisoned");
        let mut labels: Vec<String> = loaded
            .values()
            .map(|s| format!("{}: {}", s.manifest.id, s.manifest.description))
            .collect();
        labels.sort();
        labels
    }

    pub fn tool_names(&self, id: &str) -> Vec<String> {
        self.loaded
            .lock()
            .expect("loaded lock poisoned")
            .get(id)
            .map(|s| s.tool_names.clone())
            .unwrap_or_default()
    }

    /// Readiness report for `skill check`.
    pub fn check(&self, id: &str) -> Option<SkillCheck> {
        let discovered = self.discover().into_iter().find(|d| d.manifest.id == id)?;
        Some(SkillCheck {
            id: id.to_string(),
            has_implementation: self
                .implementations
                .lock()
                .expect("implementation lock poisoned")
                .contains_key(id),
            missing_env: self.env_satisfied(id, &discovered.manifest),
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use adytum_tools::{ToolCall, ToolResult};

    use super::*;

    struct PingTool {
        name: String,
    }

    #[async_trait]
    impl Tool for PingTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "answers pong"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall) -> ToolResult {
            ToolResult::ok(&call.id, "pong")
        }
    }

    struct PingSkill;

    impl Skill for PingSkill {
        fn id(&self) -> &str {
            "ping"
        }
        fn register(&self, api: &mut SkillApi) -> anyhow::Result<()> {
            api.register_tool(Arc::new(PingTool {
                name: "ping".into(),
            }));
            Ok(())
        }
    }

    struct SecretSkill;

    impl Skill for SecretSkill {
        fn id(&self) -> &str {
            "secretive"
        }
        fn register(&self, api: &mut SkillApi) -> anyhow::Result<()> {
            let token = api
                .secret("SECRETIVE_TOKEN")
                .ok_or_else(|| anyhow::anyhow!("token missing"))?;
            api.register_tool(Arc::new(PingTool {
                name: format!("secretive_{}", token.len()),
            }));
            Ok(())
        }
    }

    fn write_manifest(root: &std::path::Path, id: &str, required_env: &[&str]) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        let mut text = format!("id: {id}\ndescription: test skill\n");
        if !required_env.is_empty() {
            text.push_str("required_env:\n");
            for e in required_env {
                text.push_str(&format!("  - {e}\n"));
            }
        }
        std::fs::write(dir.join("manifest.yaml"), text).unwrap();
    }

    #[test]
    fn load_registers_tools_from_manifest_and_implementation() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "ping", &[]);
        let registry = Arc::new(ToolRegistry::new());
        let loader = SkillLoader::new(tmp.path(), Arc::clone(&registry));
        loader.register_implementation(Arc::new(PingSkill));

        let loaded = loader.load_all();
        assert_eq!(loaded, vec!["ping"]);
        assert!(registry.has("ping"));
        assert_eq!(loader.tool_names("ping"), vec!["ping"]);
    }

    #[test]
    fn manifest_without_implementation_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "ghost", &[]);
        let registry = Arc::new(ToolRegistry::new());
        let loader = SkillLoader::new(tmp.path(), Arc::clone(&registry));
        assert!(loader.load_all().is_empty());
    }

    #[test]
    fn missing_required_env_skips_skill() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "ping", &["ADYTUM_TEST_UNSET_VAR_XYZ"]);
        let registry = Arc::new(ToolRegistry::new());
        let loader = SkillLoader::new(tmp.path(), Arc::clone(&registry));
        loader.register_implementation(Arc::new(PingSkill));
        assert!(loader.load_all().is_empty());

        let check = loader.check("ping").unwrap();
        assert!(check.has_implementation);
        assert_eq!(check.missing_env, vec!["ADYTUM_TEST_UNSET_VAR_XYZ"]);
    }

    #[test]
    fn injected_secrets_satisfy_required_env_and_reach_the_skill() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "secretive", &["SECRETIVE_TOKEN"]);
        let registry = Arc::new(ToolRegistry::new());
        let loader = SkillLoader::new(tmp.path(), Arc::clone(&registry));
        loader.register_implementation(Arc::new(SecretSkill));
        loader.set_skill_secrets(
            "secretive",
            HashMap::from([("SECRETIVE_TOKEN".to_string(), "abc".to_string())]),
        );

        let loaded = loader.load_all();
        assert_eq!(loaded, vec!["secretive"]);
        // Tool name encodes the secret length, proving the secret arrived.
        assert!(registry.has("secretive_3"));
    }

    #[test]
    fn reload_unregisters_then_reregisters() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "ping", &[]);
        let registry = Arc::new(ToolRegistry::new());
        let loader = SkillLoader::new(tmp.path(), Arc::clone(&registry));
        loader.register_implementation(Arc::new(PingSkill));

        loader.load_all();
        assert!(registry.has("ping"));

        let reloaded = loader.reload();
        assert_eq!(reloaded, vec!["ping"]);
        assert!(registry.has("ping"));
        assert_eq!(loader.loaded_ids(), vec!["ping"]);
    }

    #[test]
    fn prompt_labels_list_loaded_skills() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "ping", &[]);
        let registry = Arc::new(ToolRegistry::new());
        let loader = SkillLoader::new(tmp.path(), Arc::clone(&registry));
        loader.register_implementation(Arc::new(PingSkill));
        loader.load_all();
        let labels = loader.prompt_labels();
        assert_eq!(labels, vec!["ping: test skill"]);
    }
}
