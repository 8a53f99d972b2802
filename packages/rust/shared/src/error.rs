//! Error types for Campus Guide.
//!
//! Library crates use [`GuideError`] via `thiserror`.
//! The CLI wraps this with `color-eyre`, and the HTTP layer maps
//! [`ErrorKind`] to a status code.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Top-level error type for all Campus Guide operations.
#[derive(Debug, thiserror::Error)]
pub enum GuideError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Every fetch strategy failed for `url`.
    #[error("fetch error: {url}: {} attempt(s) failed ({})", .attempts.len(), summarize(.attempts))]
    Fetch {
        url: String,
        attempts: Vec<FetchAttempt>,
    },

    /// Model output could not be read as the expected structure.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Referenced scope is absent or a required input is blank.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Store or transaction failure. Any open transaction is rolled back.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Language model transport or protocol failure.
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GuideError>;

/// Stable, serializable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    UpstreamFetch,
    ExtractionParse,
    Validation,
    Persistence,
    Llm,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::UpstreamFetch => "upstream_fetch",
            Self::ExtractionParse => "extraction_parse",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::Llm => "llm",
            Self::Io => "io",
        }
    }
}

impl GuideError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Fetch { .. } => ErrorKind::UpstreamFetch,
            Self::Parse { .. } => ErrorKind::ExtractionParse,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Llm(_) => ErrorKind::Llm,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch attempts
// ---------------------------------------------------------------------------

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// TLS handshake or certificate failure.
    Tls,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// Connection could not be established (DNS, refused, reset).
    Connect,
    /// The server answered with a non-success status.
    Status,
    /// The response body could not be read.
    Body,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tls => "tls",
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Status => "status",
            Self::Body => "body",
        };
        f.write_str(s)
    }
}

/// One failed attempt in the fetch fallback chain.
#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    /// Strategy name (`verified`, `unverified`, `downgraded`).
    pub strategy: &'static str,
    /// The URL actually requested.
    pub url: String,
    pub class: FailureClass,
    pub detail: String,
}

impl fmt::Display for FetchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.strategy, self.class, self.detail)
    }
}

fn summarize(attempts: &[FetchAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GuideError::config("missing model");
        assert_eq!(err.to_string(), "config error: missing model");

        let err = GuideError::validation("scope '9' not found");
        assert!(err.to_string().contains("scope '9'"));
    }

    #[test]
    fn fetch_error_lists_every_attempt() {
        let err = GuideError::Fetch {
            url: "https://campus.example/b1".into(),
            attempts: vec![
                FetchAttempt {
                    strategy: "verified",
                    url: "https://campus.example/b1".into(),
                    class: FailureClass::Tls,
                    detail: "invalid peer certificate".into(),
                },
                FetchAttempt {
                    strategy: "downgraded",
                    url: "http://campus.example/b1".into(),
                    class: FailureClass::Status,
                    detail: "HTTP 404 Not Found".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 attempt(s) failed"));
        assert!(msg.contains("verified [tls]"));
        assert!(msg.contains("downgraded [status]: HTTP 404"));
    }

    #[test]
    fn kinds_are_distinguishable() {
        assert_eq!(
            GuideError::Fetch {
                url: String::new(),
                attempts: vec![]
            }
            .kind(),
            ErrorKind::UpstreamFetch
        );
        assert_eq!(GuideError::parse("x").kind(), ErrorKind::ExtractionParse);
        assert_eq!(GuideError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            GuideError::Persistence("x".into()).kind(),
            ErrorKind::Persistence
        );
        assert_eq!(ErrorKind::UpstreamFetch.as_str(), "upstream_fetch");
    }
}
