//! End-to-end ingestion and question answering.
//!
//! Ingestion: URL → fetch → text → extract → persist.
//! Query: question → scoped/global retrieval → answer.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use campusguide_crawler::{Fetcher, to_text};
use campusguide_shared::{
    AppConfig, GuideError, IngestionOutcome, IngestionRequest, QueryAnswer, QueryRequest, Result,
    Scope, validate_llm_config,
};
use campusguide_storage::Storage;

use crate::composer::AnswerComposer;
use crate::extractor::{ExtractionInput, KnowledgeExtractor};
use crate::llm::{LanguageModel, OpenAiChatModel};
use crate::prompts::PromptTemplates;
use crate::retriever::{RetrievalLimits, Retriever};

/// Tunables that do not belong to any single component.
#[derive(Debug, Clone, Copy)]
pub struct GuideSettings {
    pub extraction_temperature: f32,
    pub answer_temperature: f32,
    pub max_page_chars: usize,
    pub limits: RetrievalLimits,
}

impl Default for GuideSettings {
    fn default() -> Self {
        Self {
            extraction_temperature: 0.2,
            answer_temperature: 0.3,
            max_page_chars: 12_000,
            limits: RetrievalLimits::default(),
        }
    }
}

impl GuideSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            extraction_temperature: config.llm.extraction_temperature,
            answer_temperature: config.llm.answer_temperature,
            max_page_chars: config.ingest.max_page_chars,
            limits: RetrievalLimits {
                scoped: config.retrieval.scoped_limit,
                global: config.retrieval.global_limit,
            },
        }
    }
}

/// Progress callback for ingestion phases.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when ingestion completes successfully.
    fn done(&self, outcome: &IngestionOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &IngestionOutcome) {}
}

/// The campus guide service: one store, one fetcher, one model.
///
/// Immutable after construction, so a single instance can be shared across
/// concurrent requests.
pub struct CampusGuide {
    storage: Storage,
    fetcher: Fetcher,
    model: Arc<dyn LanguageModel>,
    prompts: PromptTemplates,
    settings: GuideSettings,
}

impl CampusGuide {
    pub fn new(
        storage: Storage,
        fetcher: Fetcher,
        model: Arc<dyn LanguageModel>,
        prompts: PromptTemplates,
        settings: GuideSettings,
    ) -> Self {
        Self {
            storage,
            fetcher,
            model,
            prompts,
            settings,
        }
    }

    /// Open the configured store and build the production components.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        validate_llm_config(config)?;
        let storage = Storage::open(&config.database.resolved_path()?).await?;
        let fetcher = Fetcher::new(&config.fetch)?;
        let model = OpenAiChatModel::new(&config.llm)?;
        let prompts = PromptTemplates::load(config.prompts.dir.as_deref().map(Path::new))?;

        info!(
            db = %storage.path().display(),
            model = model.model(),
            "campus guide ready"
        );

        Ok(Self::new(
            storage,
            fetcher,
            Arc::new(model),
            prompts,
            GuideSettings::from_config(config),
        ))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Crawl `request.url` and store its facts under `request.scope_id`.
    ///
    /// The scope is checked before any network call. Every run after that
    /// point is recorded as an ingest job, completed or failed.
    #[instrument(skip_all, fields(scope_id = %request.scope_id, url = %request.url))]
    pub async fn ingest(
        &self,
        request: &IngestionRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestionOutcome> {
        let scope_id = request.scope_id.trim();
        if scope_id.is_empty() {
            return Err(GuideError::validation("scopeId must not be empty"));
        }
        if request.url.trim().is_empty() {
            return Err(GuideError::validation("url must not be empty"));
        }

        let scope = self
            .storage
            .get_scope(scope_id)
            .await?
            .ok_or_else(|| GuideError::validation(format!("unknown scope '{scope_id}'")))?;

        let job_id = self
            .storage
            .start_ingest_job(&scope.id, &request.url, request.replace_existing)
            .await?;

        match self.run_ingest(&scope, request, progress).await {
            Ok((content_hash, faq_count)) => {
                // Knowledge is already committed; the job row is audit only.
                if let Err(record_err) = self
                    .storage
                    .complete_ingest_job(&job_id, &content_hash, faq_count)
                    .await
                {
                    warn!(job_id = %job_id, error = %record_err, "could not record completed ingest job");
                }
                let outcome = IngestionOutcome {
                    scope_id: scope.id.clone(),
                    faq_count,
                };
                info!(
                    faq_count,
                    replace = request.replace_existing,
                    "ingestion complete"
                );
                progress.done(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!(kind = e.kind().as_str(), error = %e, "ingestion failed");
                if let Err(record_err) = self.storage.fail_ingest_job(&job_id, &e.to_string()).await
                {
                    warn!(job_id = %job_id, error = %record_err, "could not record failed ingest job");
                }
                Err(e)
            }
        }
    }

    /// Returns the body hash and the extracted count.
    async fn run_ingest(
        &self,
        scope: &Scope,
        request: &IngestionRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<(String, usize)> {
        progress.phase("Fetching page");
        let page = self.fetcher.fetch(&request.url).await?;
        let content_hash = sha256_hex(&page.body);

        progress.phase("Extracting text");
        let text = to_text(&page.body);

        progress.phase("Extracting knowledge");
        let scope_label = match request.scope_label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => scope.location_label(),
        };
        let extractor = KnowledgeExtractor::new(
            self.model.as_ref(),
            &self.prompts,
            self.settings.extraction_temperature,
            self.settings.max_page_chars,
        );
        let entries = extractor
            .extract(ExtractionInput {
                scope_id: &scope.id,
                scope_label: &scope_label,
                url: &request.url,
                text: &text,
            })
            .await?;

        progress.phase("Saving knowledge");
        self.storage
            .persist_knowledge(&scope.id, &entries, request.replace_existing)
            .await?;

        Ok((content_hash, entries.len()))
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Answer a question from stored knowledge.
    #[instrument(skip_all)]
    pub async fn ask(&self, request: &QueryRequest) -> Result<QueryAnswer> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(GuideError::validation("question must not be empty"));
        }

        let scope_id = request.scope_id();
        let scope_label = non_blank(request.scope_label.as_deref());
        let context = non_blank(request.context.as_deref());

        let matches = Retriever::new(&self.storage, self.settings.limits)
            .retrieve(question, scope_id.as_deref(), scope_label)
            .await?;

        let answer = AnswerComposer::new(
            self.model.as_ref(),
            &self.prompts,
            self.settings.answer_temperature,
        )
        .compose(question, &matches, scope_label, context)
        .await?;

        Ok(QueryAnswer { answer })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn sha256_hex(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
