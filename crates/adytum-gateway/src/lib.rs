// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod approval;
mod routes;
mod state;
mod ws;

pub use approval::ApprovalBroker;
pub use routes::router;
pub use state::{GatewayState, NewWorkspace, Workspace};
pub use ws::{ClientFrame, ServerFrame};

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

/// Serve the gateway until the process exits.
pub async fn serve(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
