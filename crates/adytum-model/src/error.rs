// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Classified failure from one provider call.
///
/// The router dispatches on the variant: rate-limit/quota set a per-model
/// cooldown, auth failures mark the credential unhealthy, transport failures
/// advance to the next candidate without a cooldown.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Map an HTTP status + response body to the classified error.
    ///
    /// 401/403 → `Auth`; 429 → `QuotaExceeded` when the body mentions quota or
    /// billing, else `RateLimited`; 5xx → `Transport`; anything else →
    /// `InvalidRequest`.
    pub fn from_status(status: u16, body: &str) -> Self {
        let snippet = body.chars().take(300).collect::<String>();
        match status {
            401 | 403 => Self::Auth(snippet),
            429 => {
                let lower = snippet.to_lowercase();
                if lower.contains("quota") || lower.contains("billing") {
                    Self::QuotaExceeded(snippet)
                } else {
                    Self::RateLimited(snippet)
                }
            }
            s if s >= 500 => Self::Transport(format!("HTTP {s}: {snippet}")),
            s => Self::InvalidRequest(format!("HTTP {s}: {snippet}")),
        }
    }

    /// True when the router should cool the model down before retrying it.
    pub fn triggers_cooldown(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::QuotaExceeded(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_maps_to_auth() {
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            ProviderError::Auth(_)
        ));
    }

    #[test]
    fn status_429_with_quota_text_maps_to_quota() {
        assert!(matches!(
            ProviderError::from_status(429, "monthly quota exhausted"),
            ProviderError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn status_429_plain_maps_to_rate_limit() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
    }

    #[test]
    fn status_503_maps_to_transport() {
        assert!(matches!(
            ProviderError::from_status(503, "overloaded"),
            ProviderError::Transport(_)
        ));
    }

    #[test]
    fn only_limit_errors_trigger_cooldown() {
        assert!(ProviderError::RateLimited("x".into()).triggers_cooldown());
        assert!(ProviderError::QuotaExceeded("x".into()).triggers_cooldown());
        assert!(!ProviderError::Auth("x".into()).triggers_cooldown());
        assert!(!ProviderError::Transport("x".into()).triggers_cooldown());
    }
}
