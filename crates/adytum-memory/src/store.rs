// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Persistent memory store contract plus the SQLite/FTS5 implementation.
//!
//! The agent core only consumes `search(query, k) → top-k`; listing and
//! category filters exist for the dashboard.  Search is best-effort: a
//! store failure degrades to an empty result, never an error in the loop.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::redact::redact_secrets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    EpisodicRaw,
    EpisodicSummary,
    Dream,
    Monologue,
    Curiosity,
    General,
    UserFact,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EpisodicRaw => "episodic_raw",
            Self::EpisodicSummary => "episodic_summary",
            Self::Dream => "dream",
            Self::Monologue => "monologue",
            Self::Curiosity => "curiosity",
            Self::General => "general",
            Self::UserFact => "user_fact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "episodic_raw" => Some(Self::EpisodicRaw),
            "episodic_summary" => Some(Self::EpisodicSummary),
            "dream" => Some(Self::Dream),
            "monologue" => Some(Self::Monologue),
            "curiosity" => Some(Self::Curiosity),
            "general" => Some(Self::General),
            "user_fact" => Some(Self::UserFact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub id: String,
    pub content: String,
    pub category: MemoryCategory,
    pub tags: Vec<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryFact {
    pub fn new(
        content: impl Into<String>,
        category: MemoryCategory,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            category,
            tags: Vec::new(),
            source: source.into(),
            created_at: Utc::now(),
        }
    }
}

/// Store contract consumed by the agent core.
pub trait MemoryStore: Send + Sync {
    /// Best-effort full-text search, most relevant first.
    fn search(&self, query: &str, k: usize) -> Vec<MemoryFact>;
    /// Persist a fact.  Content is redacted before it touches disk.
    fn insert(&self, fact: MemoryFact) -> anyhow::Result<()>;
    /// Newest-first listing, optionally filtered by category.
    fn list(&self, category: Option<MemoryCategory>, limit: usize) -> Vec<MemoryFact>;
}

/// No-op store for tests and memory-less deployments.
#[derive(Default)]
pub struct NullMemory;

impl MemoryStore for NullMemory {
    fn search(&self, _query: &str, _k: usize) -> Vec<MemoryFact> {
        Vec::new()
    }
    fn insert(&self, _fact: MemoryFact) -> anyhow::Result<()> {
        Ok(())
    }
    fn list(&self, _category: Option<MemoryCategory>, _limit: usize) -> Vec<MemoryFact> {
        Vec::new()
    }
}

/// SQLite-backed store with an FTS5 index.  Single writer per database file;
/// the connection is serialised behind a mutex.
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory (
                 id         TEXT PRIMARY KEY,
                 content    TEXT NOT NULL,
                 category   TEXT NOT NULL,
                 tags       TEXT NOT NULL DEFAULT '[]',
                 source     TEXT NOT NULL DEFAULT '',
                 created_at TEXT NOT NULL
             );
             CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts
                 USING fts5(content, content='memory', content_rowid='rowid');
             CREATE TRIGGER IF NOT EXISTS memory_ai AFTER INSERT ON memory BEGIN
                 INSERT INTO memory_fts(rowid, content) VALUES (new.rowid, new.content);
             END;
             CREATE TRIGGER IF NOT EXISTS memory_ad AFTER DELETE ON memory BEGIN
                 INSERT INTO memory_fts(memory_fts, rowid, content)
                     VALUES ('delete', old.rowid, old.content);
             END;",
        )?;
        Ok(())
    }

    fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryFact> {
        let category: String = row.get(2)?;
        let tags_json: String = row.get(3)?;
        let created: String = row.get(5)?;
        Ok(MemoryFact {
            id: row.get(0)?,
            content: row.get(1)?,
            category: MemoryCategory::parse(&category).unwrap_or(MemoryCategory::General),
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            source: row.get(4)?,
            created_at: created
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

/// Reduce a free-form query to an FTS5 expression that cannot fail to
/// parse: bare alphanumeric terms joined with OR.
fn fts_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

impl MemoryStore for SqliteMemoryStore {
    fn search(&self, query: &str, k: usize) -> Vec<MemoryFact> {
        let expr = fts_query(query);
        if expr.is_empty() {
            return Vec::new();
        }
        let conn = self.conn.lock().expect("memory lock poisoned");
        let result = conn
            .prepare(
                "SELECT m.id, m.content, m.category, m.tags, m.source, m.created_at
                 FROM memory m
                 JOIN memory_fts f ON m.rowid = f.rowid
                 WHERE memory_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .and_then(|mut stmt| {
                stmt.query_map(rusqlite::params![expr, k as i64], Self::row_to_fact)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            });
        match result {
            Ok(facts) => facts,
            Err(e) => {
                warn!(error = %e, "memory search failed; returning empty set");
                Vec::new()
            }
        }
    }

    fn insert(&self, fact: MemoryFact) -> anyhow::Result<()> {
        let content = redact_secrets(&fact.content);
        let conn = self.conn.lock().expect("memory lock poisoned");
        conn.execute(
            "INSERT INTO memory (id, content, category, tags, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                fact.id,
                content,
                fact.category.as_str(),
                serde_json::to_string(&fact.tags)?,
                fact.source,
                fact.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list(&self, category: Option<MemoryCategory>, limit: usize) -> Vec<MemoryFact> {
        let conn = self.conn.lock().expect("memory lock poisoned");
        let result = match category {
            Some(cat) => conn
                .prepare(
                    "SELECT id, content, category, tags, source, created_at FROM memory
                     WHERE category = ?1 ORDER BY created_at DESC LIMIT ?2",
                )
                .and_then(|mut stmt| {
                    stmt.query_map(
                        rusqlite::params![cat.as_str(), limit as i64],
                        Self::row_to_fact,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()
                }),
            None => conn
                .prepare(
                    "SELECT id, content, category, tags, source, created_at FROM memory
                     ORDER BY created_at DESC LIMIT ?1",
                )
                .and_then(|mut stmt| {
                    stmt.query_map(rusqlite::params![limit as i64], Self::row_to_fact)?
                        .collect::<rusqlite::Result<Vec<_>>>()
                }),
        };
        match result {
            Ok(facts) => facts,
            Err(e) => {
                warn!(error = %e, "memory list failed; returning empty set");
                Vec::new()
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
