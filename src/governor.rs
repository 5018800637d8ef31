//! Quota decisions: when a failed or pending call should proceed, sleep
//! briefly, or sleep until the rate-limit window resets.

use serde::Deserialize;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::github::GitHubClient;

/// Wait applied when a 403 arrives with quota remaining (GitHub's abuse
/// heuristics) or when the quota state cannot be read at all.
pub const SHORT_WAIT: Duration = Duration::from_secs(5);

/// Safety margin past the advertised reset instant.
const RESET_MARGIN: Duration = Duration::from_secs(10);

/// Point-in-time read of the core REST quota. Never cached beyond a single
/// decision.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub reset: u64,
}

impl RateLimitSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 || self.used >= self.limit
    }

    /// Seconds until the quota window resets, zero if already past.
    pub fn time_until_reset(&self, now_epoch: u64) -> Duration {
        Duration::from_secs(self.reset.saturating_sub(now_epoch))
    }
}

/// Advisory partition of a large job list into hour-sized batches. Pacing is
/// enforced by the governor at runtime; this exists for operator visibility
/// and ETA logging.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub items_per_hour: usize,
    pub batch_sizes: Vec<usize>,
    pub total_batches: usize,
}

#[derive(Clone)]
pub struct RateLimitGovernor {
    client: GitHubClient,
}

impl RateLimitGovernor {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    /// Read the current quota state. Errors propagate; callers on the retry
    /// path degrade to [`SHORT_WAIT`], callers gating a new batch treat a
    /// failure as fatal.
    pub async fn snapshot(&self) -> Result<RateLimitSnapshot, ScrapeError> {
        self.client.fetch_rate_limit().await
    }

    /// How long to wait given a quota snapshot: until reset (plus margin)
    /// when the quota is spent, a short fixed pause otherwise.
    pub fn decide(snapshot: &RateLimitSnapshot, now_epoch: u64) -> Duration {
        if snapshot.is_exhausted() {
            snapshot.time_until_reset(now_epoch) + RESET_MARGIN
        } else {
            SHORT_WAIT
        }
    }

    /// Partition `total_items` into batches sized to fit the hourly call
    /// budget, the last one remainder-sized.
    pub fn estimate_batch(
        total_items: usize,
        max_calls_per_hour: usize,
        estimated_calls_per_item: usize,
    ) -> BatchPlan {
        let items_per_hour = (max_calls_per_hour / estimated_calls_per_item.max(1)).max(1);
        let mut batch_sizes = Vec::new();
        let mut left = total_items;
        while left > 0 {
            let take = left.min(items_per_hour);
            batch_sizes.push(take);
            left -= take;
        }
        BatchPlan {
            items_per_hour,
            total_batches: batch_sizes.len(),
            batch_sizes,
        }
    }
}

/// Current wall-clock time as epoch seconds.
pub fn epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
