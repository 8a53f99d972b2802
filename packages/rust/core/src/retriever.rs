//! Scoped-then-global keyword retrieval.
//!
//! A question is first matched against the knowledge of the scope it names.
//! The campus-wide search runs only when that scoped search finds nothing,
//! or when no scope was named at all.

use async_trait::async_trait;
use tracing::{debug, instrument};

use campusguide_shared::{MatchOrigin, Result, RetrievalMatch};
use campusguide_storage::{KnowledgeHit, Storage};

/// Keyword lookups the retriever needs from a knowledge store.
///
/// Both searches return records whose keyword occurs inside the question,
/// ignoring case, longest keyword first and ties in insertion order.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn search_scope(
        &self,
        scope_id: &str,
        question: &str,
        limit: u32,
    ) -> Result<Vec<KnowledgeHit>>;
    async fn search_all(&self, question: &str, limit: u32) -> Result<Vec<KnowledgeHit>>;
}

#[async_trait]
impl KnowledgeIndex for Storage {
    async fn search_scope(
        &self,
        scope_id: &str,
        question: &str,
        limit: u32,
    ) -> Result<Vec<KnowledgeHit>> {
        Storage::search_scope(self, scope_id, question, limit).await
    }

    async fn search_all(&self, question: &str, limit: u32) -> Result<Vec<KnowledgeHit>> {
        Storage::search_all(self, question, limit).await
    }
}

/// Per-search result caps.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalLimits {
    pub scoped: u32,
    pub global: u32,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            scoped: 5,
            global: 10,
        }
    }
}

pub struct Retriever<'a> {
    index: &'a dyn KnowledgeIndex,
    limits: RetrievalLimits,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a dyn KnowledgeIndex, limits: RetrievalLimits) -> Self {
        Self { index, limits }
    }

    /// Matches for `question`, scoped to `scope_id` when given.
    ///
    /// Scoped matches are labelled with `scope_label` if the caller supplied
    /// one, otherwise with the stored scope's location label.
    #[instrument(skip_all, fields(scope_id = scope_id.unwrap_or("-")))]
    pub async fn retrieve(
        &self,
        question: &str,
        scope_id: Option<&str>,
        scope_label: Option<&str>,
    ) -> Result<Vec<RetrievalMatch>> {
        if let Some(scope_id) = scope_id {
            let hits = self
                .index
                .search_scope(scope_id, question, self.limits.scoped)
                .await?;
            if !hits.is_empty() {
                debug!(origin = "scoped", matches = hits.len(), "retrieved");
                let label = match scope_label.map(str::trim).filter(|l| !l.is_empty()) {
                    Some(label) => label.to_string(),
                    None => hits[0].scope.location_label(),
                };
                return Ok(hits
                    .into_iter()
                    .map(|hit| RetrievalMatch {
                        origin: MatchOrigin::Scoped,
                        location_label: label.clone(),
                        keyword: hit.keyword,
                        answer: hit.answer,
                    })
                    .collect());
            }
            debug!("no scoped matches, falling back to campus-wide search");
        }

        let hits = self.index.search_all(question, self.limits.global).await?;
        debug!(origin = "global", matches = hits.len(), "retrieved");
        Ok(hits
            .into_iter()
            .map(|hit| RetrievalMatch {
                origin: MatchOrigin::Global,
                location_label: hit.scope.location_label(),
                keyword: hit.keyword,
                answer: hit.answer,
            })
            .collect())
    }
}
