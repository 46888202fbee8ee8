// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Runtime registry: live sessions, their cancellation handles, and the
//! parent→children edge set used for cascading aborts.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Entry {
    cancel: CancellationToken,
    parent: Option<String>,
    children: Vec<String>,
}

pub struct RuntimeRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    aborted_tx: broadcast::Sender<String>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        let (aborted_tx, _) = broadcast::channel(64);
        Self {
            sessions: Mutex::new(HashMap::new()),
            aborted_tx,
        }
    }

    /// Register a session, minting its cancellation token.  When the
    /// session already exists its existing token is returned, so a caller
    /// that pre-registered and the runtime's own `ensure` agree.
    pub fn register(
        &self,
        session_id: &str,
        parent_session_id: Option<&str>,
    ) -> CancellationToken {
        let mut sessions = self.sessions.lock().expect("runtime registry lock poisoned");
        if let Some(existing) = sessions.get(session_id) {
            return existing.cancel.clone();
        }
        let token = CancellationToken::new();
        sessions.insert(
            session_id.to_string(),
            Entry {
                cancel: token.clone(),
                parent: parent_session_id.map(|s| s.to_string()),
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent_session_id {
            if let Some(p) = sessions.get_mut(parent) {
                p.children.push(session_id.to_string());
            }
        }
        debug!(session = session_id, parent = ?parent_session_id, "session registered");
        token
    }

    /// Remove a session at end-of-run.  Children stay registered; they
    /// unregister themselves, and late-arriving aborts on them are fine.
    pub fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("runtime registry lock poisoned");
        if let Some(entry) = sessions.remove(session_id) {
            if let Some(parent) = entry.parent {
                if let Some(p) = sessions.get_mut(&parent) {
                    p.children.retain(|c| c != session_id);
                }
            }
        }
        debug!(session = session_id, "session unregistered");
    }

    pub fn is_session_active(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("runtime registry lock poisoned")
            .contains_key(session_id)
    }

    /// The cancellation token for a live session.
    pub fn token(&self, session_id: &str) -> Option<CancellationToken> {
        self.sessions
            .lock()
            .expect("runtime registry lock poisoned")
            .get(session_id)
            .map(|e| e.cancel.clone())
    }

    /// Cancel a session and every descendant, pre-order.  Aborting an
    /// unknown root is a no-op (the turn may have just finished).
    pub fn abort_hierarchy(&self, root_session_id: &str) {
        let order = {
            let sessions = self.sessions.lock().expect("runtime registry lock poisoned");
            let mut order: Vec<String> = Vec::new();
            let mut stack = vec![root_session_id.to_string()];
            while let Some(id) = stack.pop() {
                if let Some(entry) = sessions.get(&id) {
                    order.push(id.clone());
                    // Reverse so the first child is processed first.
                    for child in entry.children.iter().rev() {
                        stack.push(child.clone());
                    }
                }
            }
            order
        };
        for id in &order {
            if let Some(token) = self.token(id) {
                token.cancel();
            }
            let _ = self.aborted_tx.send(id.clone());
            debug!(session = %id, root = root_session_id, "session aborted");
        }
    }

    /// Subscribe to aborted-session notifications.
    pub fn subscribe_aborted(&self) -> broadcast::Receiver<String> {
        self.aborted_tx.subscribe()
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
