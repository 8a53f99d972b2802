//! Page retrieval and text normalization.
//!
//! This crate provides:
//! - [`fetcher`]: the verified → unverified → downgraded fetch chain
//! - [`text`]: HTML to line-oriented plain text

pub mod fetcher;
pub mod text;

pub use fetcher::{FALLBACK_CHAIN, FetchStrategy, FetchedPage, Fetcher};
pub use text::to_text;
