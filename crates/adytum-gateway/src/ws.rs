// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! WebSocket frames and the per-connection pump.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use adytum_agent::{AgentEvent, RunOverrides};

use crate::state::GatewayState;

/// Frames sent by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Message {
        content: String,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workspace_id: Option<String>,
    },
    ApprovalResponse { id: String, approved: bool },
}

/// Frames sent to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Message {
        content: String,
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Stream {
        stream_type: String,
        delta: Value,
        metadata: Value,
    },
    ApprovalRequest {
        id: String,
        description: String,
        kind: String,
    },
}

fn stream_frame(env: &adytum_agent::StreamEnvelope) -> ServerFrame {
    let (stream_type, delta) = match &env.event {
        AgentEvent::Status(text) => ("status", json!(text)),
        AgentEvent::ToolCallStarted { call_id, name, args } => (
            "tool_call",
            json!({ "id": call_id, "name": name, "args": args }),
        ),
        AgentEvent::ToolResultReady {
            call_id,
            name,
            content,
            is_error,
        } => (
            "tool_result",
            json!({ "id": call_id, "name": name, "content": content, "isError": is_error }),
        ),
        AgentEvent::Response(text) => ("response", json!(text)),
        AgentEvent::TraceStart { trace_id } => ("trace_start", json!(trace_id)),
        AgentEvent::TraceEnd { trace_id, status } => (
            "trace_end",
            json!({ "traceId": trace_id, "status": format!("{status:?}").to_lowercase() }),
        ),
    };
    ServerFrame::Stream {
        stream_type: stream_type.to_string(),
        delta,
        metadata: json!({
            "sessionId": env.session_id,
            "isSubAgent": env.is_sub_agent,
            "childSessionId": env.child_session_id,
        }),
    }
}

/// Drive one websocket connection: forward stream events and approval
/// requests outward, accept messages and approval responses inward.
pub async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sink, mut source) = socket.split();
    let mut events = state.runtime.subscribe();
    let mut approvals = state.broker.subscribe();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<ServerFrame>(256);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let event_pump = {
        let out = out_tx.clone();
        tokio::spawn(async move {
            while let Ok(env) = events.recv().await {
                if out.send(stream_frame(&env)).await.is_err() {
                    break;
                }
            }
        })
    };

    let approval_pump = {
        let out = out_tx.clone();
        tokio::spawn(async move {
            while let Ok(req) = approvals.recv().await {
                let frame = ServerFrame::ApprovalRequest {
                    id: req.id,
                    description: req.description,
                    kind: req.kind,
                };
                if out.send(frame).await.is_err() {
                    break;
                }
            }
        })
    };

    while let Some(Ok(message)) = source.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Message {
                content,
                session_id,
                workspace_id: _,
            }) => {
                debug!(session = %session_id, "websocket message received");
                let state = Arc::clone(&state);
                let out = out_tx.clone();
                tokio::spawn(async move {
                    let outcome = state
                        .runtime
                        .run(&content, &session_id, RunOverrides::default())
                        .await;
                    let _ = out
                        .send(ServerFrame::Message {
                            content: outcome.response,
                            session_id,
                        })
                        .await;
                });
            }
            Ok(ClientFrame::ApprovalResponse { id, approved }) => {
                if !state.broker.resolve(&id, approved) {
                    warn!(request = %id, "approval response for unknown request");
                }
            }
            Err(e) => {
                warn!(error = %e, "unparseable websocket frame");
            }
        }
    }

    event_pump.abort();
    approval_pump.abort();
    writer.abort();
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
