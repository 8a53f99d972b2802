//! Application configuration for Campus Guide.
//!
//! User config lives at `~/.campusguide/campusguide.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GuideError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "campusguide.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".campusguide";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "campusguide.db";

// ---------------------------------------------------------------------------
// Config structs (matching campusguide.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Knowledge store location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Page fetching.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Language model endpoint.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Keyword search limits.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Ingestion tuning.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Prompt template overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path. Defaults to `~/.campusguide/campusguide.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DatabaseConfig {
    /// Resolve the configured path, falling back to the config directory.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(expand_home(p)),
            None => Ok(config_dir()?.join(DB_FILE_NAME)),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per attempt.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_redirects() -> usize {
    5
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base (`.../v1`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    /// Keyless local servers work when the variable is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for both extraction and answering.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,

    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_secs: default_llm_timeout(),
            extraction_temperature: default_extraction_temperature(),
            answer_temperature: default_answer_temperature(),
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_extraction_temperature() -> f32 {
    0.2
}
fn default_answer_temperature() -> f32 {
    0.3
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Max matches returned by a scoped search.
    #[serde(default = "default_scoped_limit")]
    pub scoped_limit: u32,

    /// Max matches returned by the campus-wide fallback.
    #[serde(default = "default_global_limit")]
    pub global_limit: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scoped_limit: default_scoped_limit(),
            global_limit: default_global_limit(),
        }
    }
}

fn default_scoped_limit() -> u32 {
    5
}
fn default_global_limit() -> u32 {
    10
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Page text beyond this many characters is cut before extraction.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_page_chars: default_max_page_chars(),
        }
    }
}

fn default_max_page_chars() -> usize {
    12_000
}

/// `[prompts]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory with template overrides (`extract_system.txt`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// `Access-Control-Allow-Origin` value; `*` allows any origin.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".into()
}
fn default_cors_origin() -> String {
    "*".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.campusguide/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| GuideError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.campusguide/campusguide.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GuideError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| GuideError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_retrieval_config(&config.retrieval)?;
    Ok(config)
}

/// Both search caps must allow at least one match.
fn validate_retrieval_config(retrieval: &RetrievalConfig) -> Result<()> {
    for (name, limit) in [
        ("retrieval.scoped_limit", retrieval.scoped_limit),
        ("retrieval.global_limit", retrieval.global_limit),
    ] {
        if limit < 1 {
            return Err(GuideError::config(format!("{name} must be at least 1, got {limit}")));
        }
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| GuideError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GuideError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| GuideError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

/// Check that the model endpoint settings are usable.
pub fn validate_llm_config(config: &AppConfig) -> Result<()> {
    if config.llm.model.trim().is_empty() {
        return Err(GuideError::config("llm.model must not be empty"));
    }
    Url::parse(&config.llm.base_url).map_err(|e| {
        GuideError::config(format!("llm.base_url '{}' is invalid: {e}", config.llm.base_url))
    })?;
    if config.llm.api_key().is_none() {
        tracing::debug!(
            var = %config.llm.api_key_env,
            "no API key set, calling the model endpoint without authorization"
        );
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retrieval.scoped_limit, 5);
        assert_eq!(parsed.retrieval.global_limit, 10);
        assert_eq!(parsed.fetch.timeout_secs, 10);
        assert_eq!(parsed.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[llm]
base_url = "http://localhost:11434/v1"
model = "qwen2.5:7b"

[database]
path = "/tmp/campus.db"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.llm.model, "qwen2.5:7b");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.ingest.max_page_chars, 12_000);
        assert_eq!(
            config.database.resolved_path().expect("path"),
            PathBuf::from("/tmp/campus.db")
        );
    }

    #[test]
    fn llm_validation() {
        let mut config = AppConfig::default();
        assert!(validate_llm_config(&config).is_ok());

        config.llm.base_url = "not a url".into();
        let err = validate_llm_config(&config).unwrap_err();
        assert!(err.to_string().contains("llm.base_url"));

        config.llm.base_url = default_base_url();
        config.llm.model = " ".into();
        assert!(validate_llm_config(&config).is_err());
    }

    #[test]
    fn init_at_custom_path_loads_back() {
        let dir = std::env::temp_dir().join(format!("cg_cfg_{}", std::process::id()));
        let path = dir.join("nested").join(CONFIG_FILE_NAME);
        init_config_at(&path).expect("init");

        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.server.bind, "127.0.0.1:8000");
        assert_eq!(loaded.llm.model, "gpt-4.1-mini");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zero_retrieval_limit_rejected_on_load() {
        let dir = std::env::temp_dir().join(format!("cg_cfg_limit_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join(CONFIG_FILE_NAME);

        std::fs::write(&path, "[retrieval]\nscoped_limit = 0\n").expect("write");
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("retrieval.scoped_limit"));

        std::fs::write(&path, "[retrieval]\nscoped_limit = 1\nglobal_limit = 1\n").expect("write");
        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.retrieval.scoped_limit, 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn api_key_absent_when_env_unset() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "CG_TEST_NONEXISTENT_KEY_12345".into();
        assert!(config.llm.api_key().is_none());
    }
}
