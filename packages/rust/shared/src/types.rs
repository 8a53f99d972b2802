//! Core domain types for the campus knowledge base.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// A building or administrative unit that knowledge records are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Unique identifier (referenced by knowledge records).
    pub id: String,
    /// Display name, e.g. `공학관`.
    pub label: String,
    /// Building number, when the campus numbers its buildings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<i64>,
}

impl Scope {
    /// Human-facing location label: `3호관(공학관)` when numbered, else the label.
    pub fn location_label(&self) -> String {
        match self.ordinal {
            Some(n) => format!("{n}호관({})", self.label),
            None => self.label.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

/// A keyword/answer pair ready to be written under some scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub keyword: String,
    pub answer: String,
}

impl KnowledgeEntry {
    /// Trim both fields; `None` if either ends up empty.
    pub fn new(keyword: &str, answer: &str) -> Option<Self> {
        let keyword = keyword.trim();
        let answer = answer.trim();
        if keyword.is_empty() || answer.is_empty() {
            return None;
        }
        Some(Self {
            keyword: keyword.to_string(),
            answer: answer.to_string(),
        })
    }
}

/// A stored knowledge row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: i64,
    pub scope_id: String,
    pub keyword: String,
    pub answer: String,
}

impl KnowledgeRecord {
    pub fn entry(&self) -> KnowledgeEntry {
        KnowledgeEntry {
            keyword: self.keyword.clone(),
            answer: self.answer.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// Which search produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    /// Found inside the scope the caller asked about.
    Scoped,
    /// Found by the campus-wide fallback search.
    Global,
}

/// One keyword hit handed to the answer composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub origin: MatchOrigin,
    pub location_label: String,
    pub keyword: String,
    pub answer: String,
}

// ---------------------------------------------------------------------------
// Entrypoint payloads
// ---------------------------------------------------------------------------

/// Ingestion request: crawl `url` and store its facts under `scope_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub scope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_label: Option<String>,
    pub url: String,
    /// Replace the scope's records (default) or merge into them.
    #[serde(default = "default_replace")]
    pub replace_existing: bool,
}

fn default_replace() -> bool {
    true
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionOutcome {
    pub scope_id: String,
    /// Size of the extracted set written by this run.
    pub faq_count: usize,
}

/// Scope ids arrive as strings or integers on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeRef {
    Number(i64),
    Text(String),
}

impl ScopeRef {
    /// Normalized string id; blank text counts as absent.
    pub fn normalized(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

/// Question about the campus, optionally scoped to one building.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl QueryRequest {
    pub fn scope_id(&self) -> Option<String> {
        self.scope_id.as_ref().and_then(ScopeRef::normalized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
}
