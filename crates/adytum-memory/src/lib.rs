// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod redact;
mod store;

pub use redact::redact_secrets;
pub use store::{MemoryCategory, MemoryFact, MemoryStore, NullMemory, SqliteMemoryStore};
