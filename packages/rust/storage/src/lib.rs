//! libSQL knowledge store for Campus Guide.
//!
//! The [`Storage`] struct wraps a local libSQL database holding scopes,
//! per-scope keyword/answer knowledge, and the ingestion run history.
//!
//! Every operation opens its own connection from the shared [`Database`]
//! handle, so concurrent ingestions and queries never share a transaction.

mod migrations;

use std::path::{Path, PathBuf};

use campusguide_shared::{GuideError, KnowledgeEntry, KnowledgeRecord, Result, Scope};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A knowledge row joined with the scope that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeHit {
    pub scope: Scope,
    pub keyword: String,
    pub answer: String,
}

/// Lifecycle state of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(GuideError::Persistence(format!(
                "unknown ingest job status '{other}'"
            ))),
        }
    }
}

/// One recorded ingestion run.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub id: String,
    pub scope_id: String,
    pub url: String,
    pub replace_existing: bool,
    pub status: JobStatus,
    /// SHA-256 of the fetched page body.
    pub content_hash: Option<String>,
    pub faq_count: Option<i64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    path: PathBuf,
}

fn db_err(e: libsql::Error) -> GuideError {
    GuideError::Persistence(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GuideError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let storage = Self {
            db,
            path: path.to_path_buf(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh connection with foreign keys enforced.
    async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(db_err)?;
        Ok(conn)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await?;
        let conn = self.connect().await?;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn.execute_batch(migration.sql).await.map_err(|e| {
                    GuideError::Persistence(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 on a fresh database.
    pub async fn get_schema_version(&self) -> Result<u32> {
        let conn = self.connect().await?;
        let result = conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => Ok(row.get::<u32>(0).unwrap_or(0)),
                _ => Ok(0),
            },
            // Table doesn't exist yet
            Err(_) => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    /// Insert a scope, or update the label and ordinal of an existing one.
    pub async fn upsert_scope(&self, scope: &Scope) -> Result<()> {
        if scope.id.trim().is_empty() {
            return Err(GuideError::validation("scope id must not be empty"));
        }
        if scope.label.trim().is_empty() {
            return Err(GuideError::validation("scope label must not be empty"));
        }

        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO scopes (id, label, ordinal) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET label = excluded.label, ordinal = excluded.ordinal",
            params![scope.id.as_str(), scope.label.as_str(), scope.ordinal],
        )
        .await
        .map_err(db_err)?;
        debug!(scope_id = %scope.id, "scope upserted");
        Ok(())
    }

    pub async fn get_scope(&self, id: &str) -> Result<Option<Scope>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, label, ordinal FROM scopes WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_scope(&row, 0)?)),
            None => Ok(None),
        }
    }

    /// All scopes, numbered buildings first in number order, then by label.
    pub async fn list_scopes(&self) -> Result<Vec<Scope>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, label, ordinal FROM scopes
                 ORDER BY ordinal IS NULL, ordinal, label",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_scope(&row, 0)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Knowledge
    // -----------------------------------------------------------------------

    /// Write `entries` under `scope_id` in a single transaction.
    ///
    /// With `replace` the scope's existing records are deleted first; without
    /// it the entries are appended. An empty `entries` slice leaves the scope
    /// untouched in both modes. Fails with a validation error when the scope
    /// does not exist, and rolls back every change if any write fails.
    ///
    /// Returns the number of entries written.
    pub async fn persist_knowledge(
        &self,
        scope_id: &str,
        entries: &[KnowledgeEntry],
        replace: bool,
    ) -> Result<usize> {
        let conn = self.connect().await?;

        if !scope_exists(&conn, scope_id).await? {
            return Err(GuideError::validation(format!(
                "unknown scope '{scope_id}'"
            )));
        }

        if entries.is_empty() {
            debug!(scope_id, replace, "no entries to persist, leaving scope untouched");
            return Ok(0);
        }

        let tx = conn.transaction().await.map_err(db_err)?;
        match write_entries(&tx, scope_id, entries, replace).await {
            Ok(deleted) => {
                tx.commit().await.map_err(db_err)?;
                info!(
                    scope_id,
                    replace,
                    deleted,
                    inserted = entries.len(),
                    "knowledge persisted"
                );
                Ok(entries.len())
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(scope_id, error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Records of one scope in insertion order.
    pub async fn list_knowledge(&self, scope_id: &str) -> Result<Vec<KnowledgeRecord>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, scope_id, keyword, answer FROM knowledge
                 WHERE scope_id = ?1 ORDER BY id",
                params![scope_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(KnowledgeRecord {
                id: row.get::<i64>(0).map_err(db_err)?,
                scope_id: row.get::<String>(1).map_err(db_err)?,
                keyword: row.get::<String>(2).map_err(db_err)?,
                answer: row.get::<String>(3).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    pub async fn count_knowledge(&self, scope_id: &str) -> Result<u64> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM knowledge WHERE scope_id = ?1",
                params![scope_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Keyword search
    // -----------------------------------------------------------------------

    /// Records of `scope_id` whose keyword occurs inside `question`,
    /// ignoring case. Longest keywords first, ties in insertion order.
    pub async fn search_scope(
        &self,
        scope_id: &str,
        question: &str,
        limit: u32,
    ) -> Result<Vec<KnowledgeHit>> {
        let conn = self.connect().await?;
        let rows = conn
            .query(
                "SELECT s.id, s.label, s.ordinal, k.keyword, k.answer
                 FROM knowledge k JOIN scopes s ON s.id = k.scope_id
                 WHERE k.scope_id = ?1 AND instr(lower(?2), lower(k.keyword)) > 0
                 ORDER BY length(k.keyword) DESC, k.id ASC
                 LIMIT ?3",
                params![scope_id, question, limit],
            )
            .await
            .map_err(db_err)?;
        collect_hits(rows).await
    }

    /// Same match rule as [`Storage::search_scope`] across every scope.
    pub async fn search_all(&self, question: &str, limit: u32) -> Result<Vec<KnowledgeHit>> {
        let conn = self.connect().await?;
        let rows = conn
            .query(
                "SELECT s.id, s.label, s.ordinal, k.keyword, k.answer
                 FROM knowledge k JOIN scopes s ON s.id = k.scope_id
                 WHERE instr(lower(?1), lower(k.keyword)) > 0
                 ORDER BY length(k.keyword) DESC, k.id ASC
                 LIMIT ?2",
                params![question, limit],
            )
            .await
            .map_err(db_err)?;
        collect_hits(rows).await
    }

    // -----------------------------------------------------------------------
    // Ingest jobs
    // -----------------------------------------------------------------------

    /// Record the start of an ingestion run. Returns the job ID.
    pub async fn start_ingest_job(&self, scope_id: &str, url: &str, replace: bool) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO ingest_jobs (id, scope_id, url, replace_existing, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                scope_id,
                url,
                replace as i64,
                JobStatus::Running.as_str(),
                now.as_str()
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    pub async fn complete_ingest_job(
        &self,
        id: &str,
        content_hash: &str,
        faq_count: usize,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE ingest_jobs
             SET status = ?1, content_hash = ?2, faq_count = ?3, finished_at = ?4
             WHERE id = ?5",
            params![
                JobStatus::Completed.as_str(),
                content_hash,
                faq_count as i64,
                now.as_str(),
                id
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn fail_ingest_job(&self, id: &str, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE ingest_jobs SET status = ?1, error = ?2, finished_at = ?3 WHERE id = ?4",
            params![JobStatus::Failed.as_str(), error, now.as_str(), id],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Runs for a scope, most recent first.
    pub async fn list_ingest_jobs(&self, scope_id: &str) -> Result<Vec<IngestJob>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, scope_id, url, replace_existing, status, content_hash,
                        faq_count, error, started_at, finished_at
                 FROM ingest_jobs WHERE scope_id = ?1
                 ORDER BY started_at DESC, id DESC",
                params![scope_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let started_at: String = row.get(8).map_err(db_err)?;
            let finished_at: Option<String> = row.get::<String>(9).ok();
            results.push(IngestJob {
                id: row.get(0).map_err(db_err)?,
                scope_id: row.get(1).map_err(db_err)?,
                url: row.get(2).map_err(db_err)?,
                replace_existing: row.get::<i64>(3).map_err(db_err)? != 0,
                status: JobStatus::parse(&row.get::<String>(4).map_err(db_err)?)?,
                content_hash: row.get::<String>(5).ok(),
                faq_count: row.get::<i64>(6).ok(),
                error: row.get::<String>(7).ok(),
                started_at: parse_timestamp(&started_at)?,
                finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn scope_exists(conn: &Connection, scope_id: &str) -> Result<bool> {
    let mut rows = conn
        .query("SELECT 1 FROM scopes WHERE id = ?1", params![scope_id])
        .await
        .map_err(db_err)?;
    Ok(rows.next().await.map_err(db_err)?.is_some())
}

/// Returns how many existing rows were deleted.
async fn write_entries(
    conn: &Connection,
    scope_id: &str,
    entries: &[KnowledgeEntry],
    replace: bool,
) -> Result<u64> {
    let deleted = if replace {
        conn.execute(
            "DELETE FROM knowledge WHERE scope_id = ?1",
            params![scope_id],
        )
        .await
        .map_err(db_err)?
    } else {
        0
    };

    for entry in entries {
        conn.execute(
            "INSERT INTO knowledge (scope_id, keyword, answer) VALUES (?1, ?2, ?3)",
            params![scope_id, entry.keyword.as_str(), entry.answer.as_str()],
        )
        .await
        .map_err(db_err)?;
    }
    Ok(deleted)
}

fn row_to_scope(row: &Row, offset: i32) -> Result<Scope> {
    Ok(Scope {
        id: row.get::<String>(offset).map_err(db_err)?,
        label: row.get::<String>(offset + 1).map_err(db_err)?,
        ordinal: row.get::<i64>(offset + 2).ok(),
    })
}

async fn collect_hits(mut rows: libsql::Rows) -> Result<Vec<KnowledgeHit>> {
    let mut hits = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_err)? {
        hits.push(KnowledgeHit {
            scope: row_to_scope(&row, 0)?,
            keyword: row.get::<String>(3).map_err(db_err)?,
            answer: row.get::<String>(4).map_err(db_err)?,
        });
    }
    Ok(hits)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GuideError::Persistence(format!("bad timestamp '{s}': {e}")))
}
