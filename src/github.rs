use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::governor::RateLimitSnapshot;
use crate::sampling::PER_PAGE;

const API_ROOT: &str = "https://api.github.com";

/// Media type that makes the stargazers endpoint include per-star timestamps.
const ACCEPT_STAR_JSON: &str = "application/vnd.github.v3.star+json";
const ACCEPT_JSON: &str = "application/vnd.github+json";

/// One stargazer entry from the star+json media type. The user payload is
/// not needed, only when the star was given.
#[derive(Debug, Clone, Deserialize)]
pub struct Stargazer {
    pub starred_at: DateTime<Utc>,
}

/// One page of stargazers plus the pagination Link header it arrived with.
#[derive(Debug)]
pub struct StargazerPage {
    pub stars: Vec<Stargazer>,
    pub link: Option<String>,
}

/// GitHub repository metadata (REST API)
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub stargazers_count: u64,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Deserialize)]
struct RateLimitResources {
    core: RateLimitSnapshot,
}

/// GitHub API client
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("startrail/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, token }
    }

    /// Build request with auth header if token available
    fn request(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req.header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Map a non-success status to the scrape-error taxonomy. Only 403/429
    /// ever reaches the retry layer; 404 and everything else fail the call
    /// outright.
    fn classify(
        subject: &str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ScrapeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status.as_u16() {
            403 | 429 => Err(ScrapeError::RateLimited {
                status: status.as_u16(),
            }),
            404 => Err(ScrapeError::NotFound(subject.to_string())),
            code => Err(ScrapeError::Http {
                status: code,
                url: url.to_string(),
            }),
        }
    }

    /// Fetch one page of stargazers (100 per page, oldest first) with their
    /// starred-at timestamps and the response's Link header.
    pub async fn fetch_stargazer_page(
        &self,
        full_name: &str,
        page: usize,
    ) -> Result<StargazerPage, ScrapeError> {
        let url = format!(
            "{}/repos/{}/stargazers?per_page={}&page={}",
            API_ROOT, full_name, PER_PAGE, page
        );
        let response = self.request(&url, ACCEPT_STAR_JSON).send().await?;
        let response = Self::classify(full_name, &url, response)?;

        let link = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let stars: Vec<Stargazer> = response.json().await?;

        Ok(StargazerPage { stars, link })
    }

    /// Fetch repository metadata, including the authoritative current star
    /// count used as the series anchor.
    pub async fn fetch_repo(&self, full_name: &str) -> Result<RepoInfo, ScrapeError> {
        let url = format!("{}/repos/{}", API_ROOT, full_name);
        let response = self.request(&url, ACCEPT_JSON).send().await?;
        let response = Self::classify(full_name, &url, response)?;
        Ok(response.json().await?)
    }

    /// Check rate limit status for the core REST resource
    pub async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot, ScrapeError> {
        let url = format!("{}/rate_limit", API_ROOT);
        let response = self.request(&url, ACCEPT_JSON).send().await?;
        let response = Self::classify("rate_limit", &url, response)?;
        let data: RateLimitResponse = response.json().await?;
        Ok(data.resources.core)
    }
}
