//! Error taxonomy for the scraping core.
//!
//! Only `RateLimited` is ever retried; everything else surfaces to the
//! caller on the first occurrence.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// HTTP 403/429. Covers both quota exhaustion and GitHub's abuse
    /// heuristics; the governor's quota snapshot decides which wait applies.
    #[error("rate limited by GitHub (HTTP {status})")]
    RateLimited { status: u16 },

    /// Repository does not exist (or is private).
    #[error("repository not found: {0}")]
    NotFound(String),

    /// Repository exists but has zero stargazers; there is no history to build.
    #[error("repository has no stargazers: {0}")]
    NoStargazers(String),

    /// Any other non-success HTTP status.
    #[error("GitHub API error {status} for {url}")]
    Http { status: u16, url: String },

    /// Network/DNS/timeout failure before a status code was received.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ScrapeError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScrapeError::RateLimited { .. })
    }
}
