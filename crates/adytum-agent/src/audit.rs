// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process-local pub/sub for trace records and security events.
//!
//! Two channels: `log` carries structured per-trace records
//! (`trace_start`, `stream.*`, `trace_end`); `security` carries approval
//! and policy events.  Consumers include the dashboard websocket bridge
//! and the persistent action-log writer, which drains via [`AuditLog::flush`].
//!
//! Constructed once and passed into every runtime, never a global singleton,
//! so tests substitute a fresh instance and observe exactly their events.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use adytum_memory::redact_secrets;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub trace_id: String,
    pub session_id: String,
    /// `trace_start` | `stream.<event kind>` | `trace_end`
    pub kind: String,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityRecord {
    pub kind: String,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

pub struct AuditLog {
    log_tx: broadcast::Sender<AuditRecord>,
    security_tx: broadcast::Sender<SecurityRecord>,
    /// Records held for the durable writer until the next flush.
    buffer: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        let (log_tx, _) = broadcast::channel(1024);
        let (security_tx, _) = broadcast::channel(256);
        Self {
            log_tx,
            security_tx,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<AuditRecord> {
        self.log_tx.subscribe()
    }

    pub fn subscribe_security(&self) -> broadcast::Receiver<SecurityRecord> {
        self.security_tx.subscribe()
    }

    /// Publish a trace record.  Payload text is redacted before it can
    /// reach any durable consumer.
    pub fn publish(
        &self,
        trace_id: impl Into<String>,
        session_id: impl Into<String>,
        kind: impl Into<String>,
        detail: Value,
    ) {
        let record = AuditRecord {
            trace_id: trace_id.into(),
            session_id: session_id.into(),
            kind: kind.into(),
            detail: redact_value(detail),
            at: Utc::now(),
        };
        self.buffer
            .lock()
            .expect("audit buffer lock poisoned")
            .push(record.clone());
        let _ = self.log_tx.send(record);
    }

    pub fn security(&self, kind: impl Into<String>, detail: Value) {
        let record = SecurityRecord {
            kind: kind.into(),
            detail: redact_value(detail),
            at: Utc::now(),
        };
        let _ = self.security_tx.send(record);
    }

    /// Drain the buffered records for durable storage.
    pub fn flush(&self) -> Vec<AuditRecord> {
        std::mem::take(&mut *self.buffer.lock().expect("audit buffer lock poisoned"))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Redact every string leaf of a JSON value.
fn redact_value(v: Value) -> Value {
    match v {
        Value::String(s) => Value::String(redact_secrets(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, val)| (k, redact_value(val)))
                .collect(),
        ),
        other => other,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
