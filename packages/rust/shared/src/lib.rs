//! Shared types, error model, and configuration for Campus Guide.
//!
//! This crate is the foundation depended on by all other Campus Guide crates.
//! It provides:
//! - [`GuideError`]: the unified error type
//! - Domain types ([`Scope`], [`KnowledgeEntry`], [`RetrievalMatch`], entrypoint payloads)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, FetchConfig, IngestConfig, LlmConfig, PromptsConfig,
    RetrievalConfig, ServerConfig, config_dir, config_file_path, init_config, init_config_at,
    load_config, load_config_from, validate_llm_config,
};
pub use error::{ErrorKind, FailureClass, FetchAttempt, GuideError, Result};
pub use types::{
    IngestionOutcome, IngestionRequest, KnowledgeEntry, KnowledgeRecord, MatchOrigin,
    QueryAnswer, QueryRequest, RetrievalMatch, Scope, ScopeRef,
};
