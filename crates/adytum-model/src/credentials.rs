// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Ordered credential lookup with health tracking.
//!
//! Resolution never errors: a miss returns `None` and the caller surfaces a
//! provider-scoped "no auth available" failure.  Resolution order, first
//! success wins:
//!
//! 1. explicit literal or `env:`-reference passed as the config hint,
//!    then the provider's hint from the config file;
//! 2. a credential stored against the active profile label and healthy;
//! 3. any healthy stored credential for the provider;
//! 4. the process environment variable derived from the provider id
//!    (`{PROVIDER}_API_KEY`, uppercased, non-alphanumerics → `_`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use adytum_config::ProviderHint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Bearer,
    None,
}

/// A successfully resolved credential.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAuth {
    pub provider: String,
    /// Empty for `AuthMode::None` (local providers).
    pub secret: String,
    pub mode: AuthMode,
    /// Where the secret came from, for status display ("config", "profile
    /// work", "env OPENAI_API_KEY", …).  Never contains the secret itself.
    pub source_detail: String,
}

/// One credential in the profile store (external collaborator file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub provider: String,
    pub secret: String,
    pub profile: String,
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    #[serde(default)]
    pub last_verified: Option<DateTime<Utc>>,
}

fn default_healthy() -> bool {
    true
}

struct Inner {
    store: Vec<StoredCredential>,
    /// Cache keyed by `(provider, config_hint)`.  Evicted whenever a
    /// credential's `healthy` flag transitions.
    cache: HashMap<(String, String), ResolvedAuth>,
}

pub struct CredentialResolver {
    hints: HashMap<String, ProviderHint>,
    active_profile: String,
    inner: Mutex<Inner>,
}

impl CredentialResolver {
    pub fn new(hints: HashMap<String, ProviderHint>, active_profile: impl Into<String>) -> Self {
        Self {
            hints,
            active_profile: active_profile.into(),
            inner: Mutex::new(Inner {
                store: Vec::new(),
                cache: HashMap::new(),
            }),
        }
    }

    /// Replace the profile store contents (used at startup and by tests).
    pub fn set_store(&self, creds: Vec<StoredCredential>) {
        let mut inner = self.inner.lock().expect("credential lock poisoned");
        inner.store = creds;
        inner.cache.clear();
    }

    /// Load the profile store from a JSON file.  A missing file leaves the
    /// store empty; that is not an error.
    pub fn load_store(&self, path: &Path) {
        if let Ok(text) = std::fs::read_to_string(path) {
            match serde_json::from_str::<Vec<StoredCredential>>(&text) {
                Ok(creds) => self.set_store(creds),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed credential store");
                }
            }
        }
    }

    /// Environment variable name derived from a provider id.
    pub fn env_var_for(provider: &str) -> String {
        let mut name: String = provider
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        name.push_str("_API_KEY");
        name
    }

    /// Resolve a credential for `provider`.  Returns `None` when nothing is
    /// available; callers must not treat that as an exception.
    pub fn resolve(
        &self,
        provider: &str,
        config_hint: Option<&str>,
        mode: Option<AuthMode>,
    ) -> Option<ResolvedAuth> {
        let cache_key = (provider.to_string(), config_hint.unwrap_or("").to_string());
        {
            let inner = self.inner.lock().expect("credential lock poisoned");
            if let Some(hit) = inner.cache.get(&cache_key) {
                return Some(hit.clone());
            }
        }

        let resolved = self.resolve_uncached(provider, config_hint, mode);
        if let Some(ref auth) = resolved {
            debug!(provider, source = %auth.source_detail, "credential resolved");
            let mut inner = self.inner.lock().expect("credential lock poisoned");
            inner.cache.insert(cache_key, auth.clone());
        }
        resolved
    }

    fn resolve_uncached(
        &self,
        provider: &str,
        config_hint: Option<&str>,
        mode: Option<AuthMode>,
    ) -> Option<ResolvedAuth> {
        let mode = mode.unwrap_or_default();
        let auth = |secret: String, source: String| ResolvedAuth {
            provider: provider.to_string(),
            secret,
            mode,
            source_detail: source,
        };

        // Providers that authenticate with nothing (local servers) resolve
        // immediately when the caller asked for AuthMode::None.
        if mode == AuthMode::None {
            return Some(auth(String::new(), "none".into()));
        }

        // (1) explicit hint: literal or env:VAR reference, then the config map.
        if let Some(hint) = config_hint {
            if let Some(var) = hint.strip_prefix("env:") {
                if let Ok(secret) = std::env::var(var) {
                    if !secret.is_empty() {
                        return Some(auth(secret, format!("env {var}")));
                    }
                }
            } else if !hint.is_empty() {
                return Some(auth(hint.to_string(), "config".into()));
            }
        }
        if let Some(h) = self.hints.get(provider) {
            if let Some(k) = &h.api_key {
                return Some(auth(k.clone(), "config".into()));
            }
            if let Some(var) = &h.api_key_env {
                if let Ok(secret) = std::env::var(var) {
                    if !secret.is_empty() {
                        return Some(auth(secret, format!("env {var}")));
                    }
                }
            }
        }

        // (2) active profile, healthy only.
        {
            let inner = self.inner.lock().expect("credential lock poisoned");
            if let Some(c) = inner.store.iter().find(|c| {
                c.provider == provider && c.profile == self.active_profile && c.healthy
            }) {
                return Some(ResolvedAuth {
                    provider: provider.to_string(),
                    secret: c.secret.clone(),
                    mode: c.mode,
                    source_detail: format!("profile {}", c.profile),
                });
            }

            // (3) any healthy credential for the provider.
            if let Some(c) = inner
                .store
                .iter()
                .find(|c| c.provider == provider && c.healthy)
            {
                return Some(ResolvedAuth {
                    provider: provider.to_string(),
                    secret: c.secret.clone(),
                    mode: c.mode,
                    source_detail: format!("profile {}", c.profile),
                });
            }
        }

        // (4) derived environment variable.
        let var = Self::env_var_for(provider);
        if let Ok(secret) = std::env::var(&var) {
            if !secret.is_empty() {
                return Some(auth(secret, format!("env {var}")));
            }
        }

        None
    }

    /// Flip every stored credential for `provider` to unhealthy and evict the
    /// cache entries so the next resolve re-runs the full lookup.
    pub fn mark_failed(&self, provider: &str) {
        let mut inner = self.inner.lock().expect("credential lock poisoned");
        for c in inner.store.iter_mut().filter(|c| c.provider == provider) {
            c.healthy = false;
        }
        inner.cache.retain(|(p, _), _| p != provider);
    }

    /// Mark the provider's stored credentials healthy again and stamp the
    /// verification time.  Also evicts the cache (health transition).
    pub fn mark_verified(&self, provider: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("credential lock poisoned");
        for c in inner.store.iter_mut().filter(|c| c.provider == provider) {
            c.healthy = true;
            c.last_verified = Some(now);
        }
        inner.cache.retain(|(p, _), _| p != provider);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
