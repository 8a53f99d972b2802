//! SQL migration definitions for the Campus Guide database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its own version in `schema_migrations` so reopening is a no-op.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: scopes, knowledge, ingest_jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Buildings / administrative units
CREATE TABLE IF NOT EXISTS scopes (
    id      TEXT PRIMARY KEY,
    label   TEXT NOT NULL,
    ordinal INTEGER
);

-- Keyword/answer facts, replaced or appended per scope
CREATE TABLE IF NOT EXISTS knowledge (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    scope_id TEXT NOT NULL REFERENCES scopes(id) ON DELETE CASCADE,
    keyword  TEXT NOT NULL CHECK (length(trim(keyword)) > 0),
    answer   TEXT NOT NULL CHECK (length(trim(answer)) > 0)
);

CREATE INDEX IF NOT EXISTS idx_knowledge_scope_id ON knowledge(scope_id);

-- Ingestion run history
CREATE TABLE IF NOT EXISTS ingest_jobs (
    id           TEXT PRIMARY KEY,
    scope_id     TEXT NOT NULL REFERENCES scopes(id) ON DELETE CASCADE,
    url          TEXT NOT NULL,
    replace_existing INTEGER NOT NULL,
    status       TEXT NOT NULL,
    content_hash TEXT,
    faq_count    INTEGER,
    error        TEXT,
    started_at   TEXT NOT NULL,
    finished_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_ingest_jobs_scope_id ON ingest_jobs(scope_id);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
