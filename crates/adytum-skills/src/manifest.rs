// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Skill package discovery.
//!
//! A skill is a **directory** under the configured skills root that
//! contains a `manifest.yaml`:
//!
//! ```yaml
//! id: gmail
//! description: Read and send mail through the user's Gmail account.
//! required_env:
//!   - ADYTUM_GOOGLE_OAUTH_CLIENT_ID
//!   - ADYTUM_GOOGLE_OAUTH_CLIENT_SECRET
//! install:
//!   - pip install google-auth-oauthlib
//! ```
//!
//! Directories without a manifest are ignored; malformed or oversized
//! manifests are logged and skipped, never fatal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillManifest {
    pub id: String,
    pub description: String,
    /// Environment variables (or injected secrets) the skill needs.
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Shell steps run by `skill install`.
    #[serde(default)]
    pub install: Vec<String>,
}

/// A discovered skill package on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredSkill {
    pub manifest: SkillManifest,
    pub dir: PathBuf,
    /// Optional INSTRUCTIONS.md body, injected into the skill's prompt.
    pub instructions: Option<String>,
}

pub fn parse_manifest(raw: &str) -> anyhow::Result<SkillManifest> {
    let manifest: SkillManifest = serde_yaml::from_str(raw)?;
    anyhow::ensure!(!manifest.id.trim().is_empty(), "manifest id must be set");
    anyhow::ensure!(
        !manifest.description.trim().is_empty(),
        "manifest description must be set"
    );
    Ok(manifest)
}

fn try_load(dir: &Path) -> Option<DiscoveredSkill> {
    let manifest_path = dir.join("manifest.yaml");
    if !manifest_path.is_file() {
        return None;
    }
    let size = manifest_path.metadata().map(|m| m.len()).unwrap_or(0);
    if size > MAX_MANIFEST_BYTES {
        warn!(path = %manifest_path.display(), size, "skipping oversized manifest");
        return None;
    }
    let raw = match std::fs::read_to_string(&manifest_path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %manifest_path.display(), error = %e, "failed to read manifest");
            return None;
        }
    };
    let manifest = match parse_manifest(&raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %manifest_path.display(), error = %e, "failed to parse manifest; skipping");
            return None;
        }
    };
    let instructions = std::fs::read_to_string(dir.join("INSTRUCTIONS.md")).ok();
    Some(DiscoveredSkill {
        manifest,
        dir: dir.to_path_buf(),
        instructions,
    })
}

/// Scan the skills root for packages, sorted by id.
pub fn discover_skills(skills_dir: &Path) -> Vec<DiscoveredSkill> {
    let Ok(entries) = std::fs::read_dir(skills_dir) else {
        return Vec::new();
    };
    let mut found: Vec<DiscoveredSkill> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| try_load(&e.path()))
        .collect();
    found.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
    found
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_skill(root: &Path, id: &str, manifest: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("manifest.yaml"), manifest).unwrap();
    }

    #[test]
    fn parse_minimal_manifest() {
        let m = parse_manifest("id: web-search\ndescription: Search the web.").unwrap();
        assert_eq!(m.id, "web-search");
        assert!(m.required_env.is_empty());
        assert!(m.install.is_empty());
    }

    #[test]
    fn parse_full_manifest() {
        let m = parse_manifest(
            "id: gmail\ndescription: Mail.\nrequired_env:\n  - ADYTUM_GOOGLE_OAUTH_CLIENT_ID\ninstall:\n  - echo setup",
        )
        .unwrap();
        assert_eq!(m.required_env, vec!["ADYTUM_GOOGLE_OAUTH_CLIENT_ID"]);
        assert_eq!(m.install, vec!["echo setup"]);
    }

    #[test]
    fn parse_rejects_missing_id() {
        assert!(parse_manifest("description: no id").is_err());
        assert!(parse_manifest("id: ''\ndescription: blank").is_err());
    }

    #[test]
    fn discover_finds_skills_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "zeta", "id: zeta\ndescription: Z.");
        write_skill(tmp.path(), "alpha", "id: alpha\ndescription: A.");
        let found = discover_skills(tmp.path());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].manifest.id, "alpha");
        assert_eq!(found[1].manifest.id, "zeta");
    }

    #[test]
    fn discover_skips_dirs_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("not-a-skill")).unwrap();
        assert!(discover_skills(tmp.path()).is_empty());
    }

    #[test]
    fn discover_skips_malformed_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "broken", ": not yaml :::");
        assert!(discover_skills(tmp.path()).is_empty());
    }

    #[test]
    fn discover_reads_instructions() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "docs", "id: docs\ndescription: D.");
        fs::write(tmp.path().join("docs/INSTRUCTIONS.md"), "Use carefully.").unwrap();
        let found = discover_skills(tmp.path());
        assert_eq!(found[0].instructions.as_deref(), Some("Use carefully."));
    }

    #[test]
    fn discover_missing_root_is_empty() {
        assert!(discover_skills(Path::new("/tmp/adytum_no_such_skills")).is_empty());
    }
}
