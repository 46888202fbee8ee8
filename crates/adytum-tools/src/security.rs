// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Path whitelist consulted by every file-touching tool.
//!
//! Loaded from `data/security.json`.  An empty or missing whitelist means
//! "unrestricted" — the gateway is self-hosted and restriction is opt-in.
//! Violations surface as user-visible "access denied" messages, never as
//! panics or loop-aborting errors.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SecurityFile {
    #[serde(default)]
    allowed_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    allowed_roots: Vec<PathBuf>,
}

impl SecurityPolicy {
    /// Unrestricted policy (no whitelist configured).
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots: roots.into_iter().map(|r| normalize(&r)).collect(),
        }
    }

    /// Load from `security.json`.  A missing file yields the permissive
    /// policy; a malformed file is logged and treated the same way.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<SecurityFile>(&text) {
                Ok(file) => Self::with_roots(file.allowed_paths),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring malformed security.json");
                    Self::permissive()
                }
            },
            Err(_) => Self::permissive(),
        }
    }

    /// Validate a path against the whitelist.
    ///
    /// Returns the normalized path on success, or a user-visible denial
    /// reason.  Parent-directory traversal that escapes every allowed root
    /// is rejected even when the literal prefix matches.
    pub fn check(&self, path: &Path) -> Result<PathBuf, String> {
        let normalized = normalize(path);
        if self.allowed_roots.is_empty() {
            return Ok(normalized);
        }
        if self
            .allowed_roots
            .iter()
            .any(|root| normalized.starts_with(root))
        {
            Ok(normalized)
        } else {
            Err(format!(
                "access denied: {} is outside the allowed workspace paths",
                path.display()
            ))
        }
    }
}

/// Lexically resolve `.` and `..` components without touching the
/// filesystem, so nonexistent paths (about to be created) still validate.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_policy_allows_anything() {
        let p = SecurityPolicy::permissive();
        assert!(p.check(Path::new("/etc/passwd")).is_ok());
    }

    #[test]
    fn path_inside_root_is_allowed() {
        let p = SecurityPolicy::with_roots(vec![PathBuf::from("/workspace")]);
        assert!(p.check(Path::new("/workspace/notes/todo.md")).is_ok());
    }

    #[test]
    fn path_outside_root_is_denied_with_reason() {
        let p = SecurityPolicy::with_roots(vec![PathBuf::from("/workspace")]);
        let err = p.check(Path::new("/etc/passwd")).unwrap_err();
        assert!(err.starts_with("access denied"));
    }

    #[test]
    fn dotdot_escape_is_caught() {
        let p = SecurityPolicy::with_roots(vec![PathBuf::from("/workspace")]);
        let err = p.check(Path::new("/workspace/../etc/passwd")).unwrap_err();
        assert!(err.starts_with("access denied"));
    }

    #[test]
    fn dotdot_inside_root_is_fine() {
        let p = SecurityPolicy::with_roots(vec![PathBuf::from("/workspace")]);
        let ok = p.check(Path::new("/workspace/a/../b.txt")).unwrap();
        assert_eq!(ok, PathBuf::from("/workspace/b.txt"));
    }

    #[test]
    fn load_missing_file_is_permissive() {
        let p = SecurityPolicy::load(Path::new("/tmp/adytum_no_such_security.json"));
        assert!(p.check(Path::new("/anywhere")).is_ok());
    }

    #[test]
    fn load_reads_allowed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("security.json");
        std::fs::write(&file, r#"{"allowed_paths": ["/workspace"]}"#).unwrap();
        let p = SecurityPolicy::load(&file);
        assert!(p.check(Path::new("/workspace/x")).is_ok());
        assert!(p.check(Path::new("/else")).is_err());
    }
}
