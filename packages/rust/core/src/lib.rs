//! Core pipelines for Campus Guide.
//!
//! Ingestion turns a building page into stored keyword/answer knowledge;
//! querying retrieves that knowledge and has a language model phrase the
//! answer. [`CampusGuide`] wires both together.

pub mod composer;
pub mod extractor;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod retriever;

pub use llm::{CompletionRequest, LanguageModel, OpenAiChatModel};
pub use pipeline::{CampusGuide, GuideSettings, ProgressReporter, SilentProgress};
pub use prompts::PromptTemplates;
pub use retriever::{KnowledgeIndex, RetrievalLimits, Retriever};

#[cfg(any(test, feature = "testing"))]
pub use llm::ScriptedModel;
