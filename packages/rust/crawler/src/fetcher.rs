//! Resilient page fetching through a fixed fallback chain.
//!
//! A fetch walks [`FALLBACK_CHAIN`] in order and stops at the first success:
//! verified TLS, then TLS without certificate checks, then the same URL over
//! plain `http`. The chain only extends past the first strategy for `https`
//! URLs, so a fetch makes at most three attempts.

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use campusguide_shared::{FailureClass, FetchAttempt, FetchConfig, GuideError, Result};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("CampusGuide/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// One step of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// The URL as given, certificates verified.
    Verified,
    /// The `https` URL with certificate verification disabled.
    Unverified,
    /// The `https` URL rewritten to `http`.
    Downgraded,
}

/// Strategies in the order they are tried.
pub const FALLBACK_CHAIN: [FetchStrategy; 3] = [
    FetchStrategy::Verified,
    FetchStrategy::Unverified,
    FetchStrategy::Downgraded,
];

impl FetchStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Unverified => "unverified",
            Self::Downgraded => "downgraded",
        }
    }

    /// URL this strategy requests for `url`, or `None` if it does not apply.
    pub fn target(&self, url: &Url) -> Option<Url> {
        let secure = url.scheme() == "https";
        match self {
            Self::Verified => Some(url.clone()),
            Self::Unverified => secure.then(|| url.clone()),
            Self::Downgraded => {
                if !secure {
                    return None;
                }
                let mut plain = url.clone();
                plain.set_scheme("http").ok()?;
                Some(plain)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Raw page content plus how it was obtained.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that finally answered.
    pub url: String,
    pub strategy: FetchStrategy,
    pub status: u16,
    pub body: String,
    /// Earlier strategies that failed before this one answered.
    pub failed_attempts: Vec<FetchAttempt>,
}

/// HTTP fetcher holding one client per certificate policy.
pub struct Fetcher {
    verified: Client,
    unverified: Client,
}

impl Fetcher {
    /// Build the verified and unverified clients with the per-attempt timeout.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let build = |accept_invalid: bool| {
            Client::builder()
                .user_agent(USER_AGENT)
                .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
                .timeout(timeout)
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| GuideError::config(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            verified: build(false)?,
            unverified: build(true)?,
        })
    }

    /// Fetch `url`, falling back along [`FALLBACK_CHAIN`].
    ///
    /// Returns [`GuideError::Fetch`] with every failed attempt once the chain
    /// is exhausted, or [`GuideError::Validation`] for a non-HTTP URL.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = parse_http_url(url)?;
        let mut attempts: Vec<FetchAttempt> = Vec::new();

        for strategy in FALLBACK_CHAIN {
            let Some(target) = strategy.target(&parsed) else {
                continue;
            };

            debug!(strategy = strategy.name(), %target, "fetch attempt");

            match self.attempt(strategy, &target).await {
                Ok((status, body)) => {
                    info!(
                        strategy = strategy.name(),
                        status,
                        bytes = body.len(),
                        failed_attempts = attempts.len(),
                        "page fetched"
                    );
                    return Ok(FetchedPage {
                        url: target.to_string(),
                        strategy,
                        status,
                        body,
                        failed_attempts: attempts,
                    });
                }
                Err(failure) => {
                    warn!(
                        strategy = strategy.name(),
                        class = %failure.class,
                        detail = %failure.detail,
                        "fetch attempt failed"
                    );
                    attempts.push(failure);
                }
            }
        }

        Err(GuideError::Fetch {
            url: url.to_string(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        strategy: FetchStrategy,
        target: &Url,
    ) -> std::result::Result<(u16, String), FetchAttempt> {
        let client = match strategy {
            FetchStrategy::Unverified => &self.unverified,
            FetchStrategy::Verified | FetchStrategy::Downgraded => &self.verified,
        };
        let failed = |class: FailureClass, detail: String| FetchAttempt {
            strategy: strategy.name(),
            url: target.to_string(),
            class,
            detail,
        };

        let response = client
            .get(target.as_str())
            .send()
            .await
            .map_err(|e| failed(classify(&e), error_chain(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(FailureClass::Status, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| failed(FailureClass::Body, format!("body read failed: {e}")))?;

        Ok((status.as_u16(), body))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| GuideError::validation(format!("invalid URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(GuideError::validation(format!(
            "unsupported URL scheme '{other}' in '{url}'"
        ))),
    }
}

/// Markers that identify TLS failures somewhere in an error's source chain.
const TLS_MARKERS: [&str; 6] = [
    "certificate",
    "tls",
    "ssl",
    "handshake",
    "corrupt message",
    "unknownissuer",
];

fn classify(err: &reqwest::Error) -> FailureClass {
    if err.is_timeout() {
        return FailureClass::Timeout;
    }
    let chain = error_chain(err).to_ascii_lowercase();
    if TLS_MARKERS.iter().any(|m| chain.contains(m)) {
        return FailureClass::Tls;
    }
    if err.is_body() || err.is_decode() {
        FailureClass::Body
    } else {
        FailureClass::Connect
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}
