// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
pub mod credentials;
mod anthropic;
mod error;
mod mock;
mod openai_compat;
mod provider;
mod router;
mod types;

pub use anthropic::AnthropicAdapter;
pub use catalog::{ApiFamily, Catalog, ModelCatalogEntry};
pub use credentials::{AuthMode, CredentialResolver, ResolvedAuth, StoredCredential};
pub use error::ProviderError;
pub use mock::{MockAdapter, ScriptedMockAdapter};
pub use openai_compat::OpenAiCompatAdapter;
pub use provider::{ChunkStream, ProviderAdapter, StreamChunk};
pub use router::{
    cooldown_for, AdapterFactory, HttpAdapterFactory, ModelRouter, ModelRuntimeStatus, ModelUsage,
    RouterError, RouterReply, RuntimeState, COOLDOWN_SCHEDULE,
};
pub use types::*;
