// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP surface consumed by the dashboard.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::{
    state::{GatewayState, NewWorkspace},
    ws::handle_socket,
};

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/workspaces", post(create_workspace).get(list_workspaces))
        .route("/api/workspaces/:id", axum::routing::delete(delete_workspace))
        .route("/api/knowledge/reindex", post(reindex_knowledge))
        .route("/api/config/roles", get(config_roles))
        .route("/api/models/runtime-status", get(models_runtime_status))
        .route("/api/link-preview", get(link_preview))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn create_workspace(
    State(state): State<Arc<GatewayState>>,
    Json(new): Json<NewWorkspace>,
) -> impl IntoResponse {
    let workspace = state.add_workspace(new);
    (StatusCode::CREATED, Json(workspace))
}

async fn list_workspaces(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.workspaces())
}

async fn delete_workspace(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.remove_workspace(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReindexRequest {
    workspace_id: String,
    /// `fast` | `deep`
    mode: String,
}

/// Knowledge indexing itself is an external collaborator; the gateway only
/// accepts the request shape and acknowledges it.
async fn reindex_knowledge(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ReindexRequest>,
) -> impl IntoResponse {
    if req.mode != "fast" && req.mode != "deep" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "mode must be 'fast' or 'deep'" })),
        );
    }
    if !state.workspaces().iter().any(|w| w.id == req.workspace_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown workspace" })),
        );
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "mode": req.mode })),
    )
}

async fn config_roles(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let chains = state.router.role_chains();
    let mut roles: Vec<String> = chains.keys().cloned().collect();
    roles.sort();
    Json(json!({ "roles": roles, "chains": chains }))
}

async fn models_runtime_status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({ "statuses": state.router.runtime_status() }))
}

#[derive(Debug, Deserialize)]
struct LinkPreviewQuery {
    url: String,
}

/// Link previews are rendered by an external collaborator; the endpoint
/// validates the URL and returns the metadata envelope shape.
async fn link_preview(Query(q): Query<LinkPreviewQuery>) -> impl IntoResponse {
    if !q.url.starts_with("http://") && !q.url.starts_with("https://") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported URL scheme" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "url": q.url, "title": null, "description": null, "image": null })),
    )
}

async fn ws_upgrade(
    State(state): State<Arc<GatewayState>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}
