// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model catalog: static metadata for known models plus user overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Wire-format family an entry speaks.  Selects the provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFamily {
    Anthropic,
    Openai,
    Mock,
}

/// Metadata for a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCatalogEntry {
    /// Provider-scoped model identifier (e.g. "gpt-4o", "claude-opus-4-5")
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// Provider identifier: "openai" | "anthropic" | "ollama" | …
    pub provider: String,
    /// Wire-format family spoken by this model's endpoint.
    pub api: ApiFamily,
    /// Endpoint override.  `None` means the family default.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Total context window in tokens (input + output)
    pub context_window: u32,
    /// Maximum output tokens per completion
    pub max_output_tokens: u32,
    /// USD per million prompt tokens.
    #[serde(default)]
    pub input_cost_per_mtok: f64,
    /// USD per million completion tokens.
    #[serde(default)]
    pub output_cost_per_mtok: f64,
    #[serde(default)]
    pub description: String,
}

impl ModelCatalogEntry {
    /// Fully-qualified id used by routing chains: `provider/model`.
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.provider, self.id)
    }

    /// Estimated USD cost of one call with the given token counts.
    pub fn estimated_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_cost_per_mtok
            + (completion_tokens as f64 / 1_000_000.0) * self.output_cost_per_mtok
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelCatalogEntry>,
}

/// The merged catalog consulted by the router.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<ModelCatalogEntry>,
}

impl Catalog {
    /// Bundled static catalog only.
    pub fn builtin() -> Self {
        Self {
            entries: static_catalog(),
        }
    }

    /// Catalog from explicit entries.  Used by tests and by `models add`.
    pub fn from_entries(entries: Vec<ModelCatalogEntry>) -> Self {
        Self { entries }
    }

    /// Bundled catalog merged with user overrides from `models.json`.
    /// User entries win on qualified-id collision; an unreadable or
    /// malformed override file is logged and ignored.
    pub fn with_overrides(models_json: &Path) -> Self {
        let mut entries = static_catalog();
        match std::fs::read_to_string(models_json) {
            Ok(text) => match serde_json::from_str::<Vec<ModelCatalogEntry>>(&text) {
                Ok(user) => {
                    for e in user {
                        let qid = e.qualified_id();
                        entries.retain(|b| b.qualified_id() != qid);
                        entries.push(e);
                    }
                }
                Err(err) => {
                    warn!(path = %models_json.display(), error = %err, "ignoring malformed models.json");
                }
            },
            Err(_) => { /* no override file; builtin catalog only */ }
        }
        Self { entries }
    }

    /// Look up by fully-qualified `provider/model` id.
    pub fn lookup(&self, qualified_id: &str) -> Option<&ModelCatalogEntry> {
        self.entries.iter().find(|e| e.qualified_id() == qualified_id)
    }

    pub fn all(&self) -> &[ModelCatalogEntry] {
        &self.entries
    }
}

/// Return all entries from the bundled static catalog.
pub fn static_catalog() -> Vec<ModelCatalogEntry> {
    let yaml = include_str!("../models.yaml");
    let catalog: CatalogFile =
        serde_yaml::from_str(yaml).expect("bundled models.yaml must be valid");
    catalog.models
}

// ── Unit tests ────────────────────────────────────────────────────────────────
