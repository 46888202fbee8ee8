// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Credential scrubbing for written-out text.
//!
//! Every string that leaves the process for durable storage (memory
//! inserts, dream snapshots, action-log payloads) passes through
//! [`redact_secrets`] first.  Replacement uses fixed tokens so downstream
//! diffing stays stable.

use std::sync::OnceLock;

use regex::Regex;

fn discord_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Bot token shape: 24 chars '.' 6 chars '.' 27 chars.
    RE.get_or_init(|| Regex::new(r"[\w-]{24}\.[\w-]{6}\.[\w-]{27}").unwrap())
}

fn google_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"AIza[0-9A-Za-z_-]{35}").unwrap())
}

fn sk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sk-[A-Za-z0-9_-]{20,}").unwrap())
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // KEY=value pairs for the known sensitive key suffixes.
    RE.get_or_init(|| {
        Regex::new(r#"\b([A-Z0-9_]*(?:API_KEY|TOKEN|SECRET))=([^\s"']+)"#).unwrap()
    })
}

/// Scrub known secret shapes out of `text`.
pub fn redact_secrets(text: &str) -> String {
    let out = discord_re().replace_all(text, "[REDACTED_DISCORD_TOKEN]");
    let out = google_re().replace_all(&out, "[REDACTED_GOOGLE_KEY]");
    let out = key_value_re().replace_all(&out, "$1=[REDACTED]");
    let out = sk_re().replace_all(&out, "[REDACTED_API_KEY]");
    out.into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
