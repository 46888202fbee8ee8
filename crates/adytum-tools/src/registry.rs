// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::{Tool, ToolCall, ToolResult};

/// A tool schema as presented to the model — mirrors the model crate's
/// `ToolSchema` shape but keeps this crate independent from it.
#[derive(Debug, Clone)]
pub struct WireSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub requires_approval: bool,
}

/// Central registry holding all available tools.
///
/// Interior-mutable so skills can register and unregister at runtime while
/// agent loops hold shared references.  Readers observe a consistent
/// snapshot; execution clones the `Arc` out of the map before awaiting.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        self.tools
            .write()
            .expect("tool registry lock poisoned")
            .insert(tool.name().to_string(), tool);
    }

    /// Remove one tool.  Returns `true` when it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .expect("tool registry lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Remove a batch of tools (skill hot-reload path).
    pub fn unregister_many<S: AsRef<str>>(&self, names: &[S]) {
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        for n in names {
            tools.remove(n.as_ref());
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<dyn Tool>> {
        let mut all: Vec<Arc<dyn Tool>> = self
            .tools
            .read()
            .expect("tool registry lock poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// JSON-schema representations for prompt inclusion, sorted by name.
    pub fn wire_schemas(&self) -> Vec<WireSchema> {
        self.get_all()
            .into_iter()
            .map(|t| WireSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
                requires_approval: t.requires_approval(),
            })
            .collect()
    }

    /// Whether the named tool is gated by the approval handler.
    /// Unknown tools report `false`; `execute` produces the error result.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.get(name).map(|t| t.requires_approval()).unwrap_or(false)
    }

    /// Execute a call.  Never panics and never errors out of the loop:
    /// unknown tools and tool-body failures all come back as error results.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::err(&call.id, format!("Unknown tool: {}", call.name));
        };
        tool.execute(call).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
