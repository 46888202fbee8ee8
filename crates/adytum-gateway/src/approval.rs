// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bridges the runtime's approval gate to websocket clients.
//!
//! The runtime suspends in [`ApprovalHandler::decide`]; the broker turns
//! that into an `approval_request` frame and parks a oneshot until a
//! matching `approval_response` arrives.  No answer within the timeout
//! denies, so a disconnected dashboard never leaves a turn hung forever.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use adytum_tools::{ApprovalDecision, ApprovalHandler, ApprovalRequest};

pub struct ApprovalBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    requests_tx: broadcast::Sender<ApprovalRequest>,
    timeout: Duration,
}

impl ApprovalBroker {
    pub fn new(timeout: Duration) -> Self {
        let (requests_tx, _) = broadcast::channel(64);
        Self {
            pending: Mutex::new(HashMap::new()),
            requests_tx,
            timeout,
        }
    }

    /// Websocket connections subscribe here and forward each request as an
    /// `approval_request` frame.
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalRequest> {
        self.requests_tx.subscribe()
    }

    /// Resolve a pending request from an inbound `approval_response`.
    /// Returns `false` for unknown or already-resolved ids.
    pub fn resolve(&self, id: &str, approved: bool) -> bool {
        let sender = self
            .pending
            .lock()
            .expect("approval lock poisoned")
            .remove(id);
        match sender {
            Some(tx) => tx.send(approved).is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("approval lock poisoned").len()
    }
}

#[async_trait]
impl ApprovalHandler for ApprovalBroker {
    async fn decide(&self, request: ApprovalRequest) -> ApprovalDecision {
        let (tx, rx) = oneshot::channel();
        let id = request.id.clone();
        self.pending
            .lock()
            .expect("approval lock poisoned")
            .insert(id.clone(), tx);
        let _ = self.requests_tx.send(request);

        let decision = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(true)) => ApprovalDecision::Approved,
            Ok(Ok(false)) => ApprovalDecision::Denied,
            // Sender dropped or timeout: deny and forget the request.
            _ => ApprovalDecision::Denied,
        };
        self.pending.lock().expect("approval lock poisoned").remove(&id);
        debug!(request = %id, ?decision, "approval resolved");
        decision
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            id: id.into(),
            description: "shell_execute(rm -r build)".into(),
            kind: "shell_execute".into(),
        }
    }

    #[tokio::test]
    async fn approve_resolves_pending_request() {
        let broker = ApprovalBroker::new(Duration::from_secs(5));
        let mut rx = broker.subscribe();

        let decide = broker.decide(request("r1"));
        let resolver = async {
            let req = rx.recv().await.unwrap();
            assert_eq!(req.id, "r1");
            assert!(broker.resolve("r1", true));
        };
        let (decision, ()) = tokio::join!(decide, resolver);
        assert_eq!(decision, ApprovalDecision::Approved);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn deny_resolves_pending_request() {
        let broker = ApprovalBroker::new(Duration::from_secs(5));
        let mut rx = broker.subscribe();
        let decide = broker.decide(request("r2"));
        let resolver = async {
            let _ = rx.recv().await.unwrap();
            assert!(broker.resolve("r2", false));
        };
        let (decision, ()) = tokio::join!(decide, resolver);
        assert_eq!(decision, ApprovalDecision::Denied);
    }

    #[tokio::test]
    async fn timeout_denies() {
        let broker = ApprovalBroker::new(Duration::from_millis(50));
        let decision = broker.decide(request("r3")).await;
        assert_eq!(decision, ApprovalDecision::Denied);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn resolving_unknown_id_is_false() {
        let broker = ApprovalBroker::new(Duration::from_secs(1));
        assert!(!broker.resolve("ghost", true));
    }
}
