//! Per-repository orchestration: one stargazers probe, a sampling plan,
//! the planned page fetches, and the authoritative anchor point.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::github::{GitHubClient, StargazerPage};
use crate::pagination::last_page_from_link;
use crate::retry::{RateLimitAdvisor, RetryExecutor};
use crate::sampling::{
    assemble_full, assemble_sampled, dedupe_by_date, DensePolicy, FetchedPage, SamplingPlan,
    StarSample, Strategy,
};

/// The two reads the assembler needs from GitHub. A seam so the pipeline is
/// testable without the network.
pub trait StarSource {
    fn stargazer_page(
        &self,
        full_name: &str,
        page: usize,
    ) -> impl Future<Output = Result<StargazerPage, ScrapeError>> + Send;

    fn repo_total(&self, full_name: &str) -> impl Future<Output = Result<u64, ScrapeError>> + Send;
}

impl StarSource for GitHubClient {
    async fn stargazer_page(
        &self,
        full_name: &str,
        page: usize,
    ) -> Result<StargazerPage, ScrapeError> {
        self.fetch_stargazer_page(full_name, page).await
    }

    async fn repo_total(&self, full_name: &str) -> Result<u64, ScrapeError> {
        Ok(self.fetch_repo(full_name).await?.stargazers_count)
    }
}

pub struct HistoryAssembler<S, A> {
    source: S,
    retry: RetryExecutor<A>,
    max_request_amount: usize,
    page_concurrency: usize,
    dense: DensePolicy,
}

impl<S: StarSource, A: RateLimitAdvisor> HistoryAssembler<S, A> {
    pub fn new(source: S, retry: RetryExecutor<A>, config: &ScrapeConfig) -> Self {
        Self {
            source,
            retry,
            max_request_amount: config.max_request_amount,
            page_concurrency: config.page_concurrency.max(1),
            dense: DensePolicy::default(),
        }
    }

    /// Reconstruct one repository's star history.
    ///
    /// Fails with [`ScrapeError::NoStargazers`] after a single call when the
    /// repository has no stars; other failures surface once the per-call
    /// retry budget is spent. The returned series always ends with today's
    /// date and the exact current star count.
    pub async fn fetch_history(&self, full_name: &str) -> Result<Vec<StarSample>, ScrapeError> {
        let first = self
            .retry
            .execute(full_name, || self.source.stargazer_page(full_name, 1))
            .await?;
        if first.stars.is_empty() {
            return Err(ScrapeError::NoStargazers(full_name.to_string()));
        }

        let page_count = last_page_from_link(first.link.as_deref().unwrap_or(""));
        let plan = SamplingPlan::build(page_count, self.max_request_amount);

        // Page 1 is already in hand; the remaining planned pages may be
        // fetched concurrently, but only within this one repository.
        let rest: Vec<usize> = plan.pages.iter().copied().filter(|&p| p != 1).collect();
        let mut fetched: Vec<FetchedPage> = stream::iter(rest)
            .map(|page| async move {
                let label = format!("{} p{}", full_name, page);
                let result = self
                    .retry
                    .execute(&label, || self.source.stargazer_page(full_name, page))
                    .await?;
                Ok::<_, ScrapeError>(FetchedPage {
                    page,
                    timestamps: result.stars.into_iter().map(|s| s.starred_at).collect(),
                })
            })
            .buffered(self.page_concurrency)
            .try_collect()
            .await?;

        fetched.push(FetchedPage {
            page: 1,
            timestamps: first.stars.into_iter().map(|s| s.starred_at).collect(),
        });
        fetched.sort_by_key(|p| p.page);

        let mut samples = match plan.strategy {
            Strategy::Full => assemble_full(&fetched, self.max_request_amount),
            Strategy::Sampled => assemble_sampled(&fetched, &self.dense),
        };

        // The anchor: today's date with the exact total, fetched fresh. It
        // is pushed last so date-dedup lets it override any approximate
        // same-day point.
        let total = self
            .retry
            .execute(full_name, || self.source.repo_total(full_name))
            .await?;
        samples.push(StarSample {
            date: Utc::now().date_naive(),
            count: total,
        });

        Ok(dedupe_by_date(samples))
    }
}
