// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;

use adytum_config::ToolsConfig;

/// Outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

/// One approval request surfaced to the user (or an automated policy).
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: String,
    pub description: String,
    /// Tool name or a coarser category ("shell_execute", "write_file").
    pub kind: String,
}

/// The runtime suspends on this before invoking any approval-gated tool.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn decide(&self, request: ApprovalRequest) -> ApprovalDecision;
}

/// Handler that approves everything.  Background sessions and tests use it.
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn decide(&self, _request: ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approved
    }
}

/// Handler that denies everything.
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn decide(&self, _request: ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Denied
    }
}

/// Per-command shell policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Run without asking
    Auto,
    /// Ask the approval handler
    Ask,
    /// Never run; return an error result
    Deny,
}

/// Pattern engine that maps a shell command to a policy decision.
/// Deny patterns always win over auto-approve patterns.
#[derive(Debug)]
pub struct ShellPolicy {
    auto_patterns: Vec<Regex>,
    deny_patterns: Vec<Regex>,
}

impl ShellPolicy {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            auto_patterns: compile(&cfg.auto_approve_patterns),
            deny_patterns: compile(&cfg.deny_patterns),
        }
    }

    pub fn decide(&self, command: &str) -> PolicyDecision {
        for re in &self.deny_patterns {
            if re.is_match(command) {
                return PolicyDecision::Deny;
            }
        }
        for re in &self.auto_patterns {
            if re.is_match(command) {
                return PolicyDecision::Auto;
            }
        }
        PolicyDecision::Ask
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(auto: &[&str], deny: &[&str]) -> ShellPolicy {
        ShellPolicy::from_config(&ToolsConfig {
            auto_approve_patterns: auto.iter().map(|s| s.to_string()).collect(),
            deny_patterns: deny.iter().map(|s| s.to_string()).collect(),
            ..ToolsConfig::default()
        })
    }

    #[test]
    fn deny_beats_auto_for_same_pattern() {
        let p = policy_with(&["rm *"], &["rm *"]);
        assert_eq!(p.decide("rm /tmp/foo"), PolicyDecision::Deny);
    }

    #[test]
    fn auto_approve_wildcard_prefix() {
        let p = policy_with(&["cat *"], &[]);
        assert_eq!(p.decide("cat /etc/hosts"), PolicyDecision::Auto);
    }

    #[test]
    fn unknown_command_results_in_ask() {
        let p = policy_with(&["cat *"], &["rm -rf /*"]);
        assert_eq!(p.decide("git commit -m test"), PolicyDecision::Ask);
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        let p = policy_with(&["ls ?"], &[]);
        assert_eq!(p.decide("ls -"), PolicyDecision::Auto);
        assert_eq!(p.decide("ls --"), PolicyDecision::Ask);
    }

    #[tokio::test]
    async fn auto_approve_handler_always_approves() {
        let h = AutoApprove;
        let d = h
            .decide(ApprovalRequest {
                id: "1".into(),
                description: "anything".into(),
                kind: "shell_execute".into(),
            })
            .await;
        assert_eq!(d, ApprovalDecision::Approved);
    }

    #[tokio::test]
    async fn deny_all_handler_always_denies() {
        let h = DenyAll;
        let d = h
            .decide(ApprovalRequest {
                id: "1".into(),
                description: "anything".into(),
                kind: "write_file".into(),
            })
            .await;
        assert_eq!(d, ApprovalDecision::Denied);
    }
}
