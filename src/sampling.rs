//! Page selection and star-count estimation.
//!
//! The stargazers endpoint serves 100 stars per page, oldest first. Under a
//! fixed request budget the full pagination range cannot always be fetched,
//! so page selection and count reconstruction trade accuracy for calls:
//! small repositories are read completely, large ones are sampled with dense
//! coverage of the earliest stars and one approximate point per far page.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Stars served per stargazers page.
pub const PER_PAGE: usize = 100;

/// One estimated point on a repository's cumulative-star curve.
///
/// Within a series, counts are non-decreasing by date except where sampled
/// page boundaries introduce approximation error; consumers must tolerate
/// small dips rather than assume strict monotonicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StarSample {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every page fits in the budget; counts are exact star indices.
    Full,
    /// Budget exceeded; pages 1-3 plus a spread of far pages are sampled.
    Sampled,
}

/// Which pages to fetch for one repository. Built once, consumed once.
#[derive(Debug, Clone)]
pub struct SamplingPlan {
    pub page_count: usize,
    pub pages: Vec<usize>,
    pub strategy: Strategy,
}

/// First page of the spread range in the sampled strategy; pages 1-3 are
/// always fetched for dense early resolution.
const SPREAD_START: usize = 4;

impl SamplingPlan {
    pub fn build(page_count: usize, max_request_amount: usize) -> Self {
        let page_count = page_count.max(1);
        let max_request_amount = max_request_amount.max(1);

        if page_count < max_request_amount {
            return Self {
                page_count,
                pages: (1..=page_count).collect(),
                strategy: Strategy::Full,
            };
        }

        // Dense early pages, then max_request_amount candidates spread evenly
        // across the remainder; duplicates and out-of-range rounds collapse.
        let mut picked: Vec<usize> = (1..=page_count.min(SPREAD_START - 1)).collect();
        let span = page_count.saturating_sub(SPREAD_START - 1);
        for i in 1..=max_request_amount {
            let page =
                (SPREAD_START as f64 + i as f64 * span as f64 / max_request_amount as f64).round()
                    as usize;
            if page <= page_count {
                picked.push(page);
            }
        }
        picked.sort_unstable();
        picked.dedup();

        Self {
            page_count,
            pages: picked,
            strategy: Strategy::Sampled,
        }
    }
}

/// The stargazer timestamps of one fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub page: usize,
    pub timestamps: Vec<DateTime<Utc>>,
}

/// Star positions kept when reading the dense early pages.
///
/// Every fifth star up to 100 (plus the first and the hundredth), every
/// tenth after that. These are tuned policy values, not derived ones.
#[derive(Debug, Clone, Copy)]
pub struct DensePolicy {
    pub dense_limit: usize,
    pub dense_step: usize,
    pub coarse_step: usize,
}

impl Default for DensePolicy {
    fn default() -> Self {
        Self {
            dense_limit: 100,
            dense_step: 5,
            coarse_step: 10,
        }
    }
}

impl DensePolicy {
    /// Whether the star at absolute 1-based position `p` becomes a sample.
    fn keeps(&self, p: usize) -> bool {
        if p <= self.dense_limit {
            p % self.dense_step == 0 || p == 1 || p == self.dense_limit
        } else {
            p % self.coarse_step == 0
        }
    }
}

/// Assemble samples from a complete fetch: flatten every star in order and
/// emit one point per `total / max_request_amount` stars (step at least 1),
/// mapping the star's day to its exact 1-based index.
pub fn assemble_full(pages: &[FetchedPage], max_request_amount: usize) -> Vec<StarSample> {
    let timestamps: Vec<DateTime<Utc>> = pages
        .iter()
        .flat_map(|p| p.timestamps.iter().copied())
        .collect();
    if timestamps.is_empty() {
        return Vec::new();
    }

    let step = (timestamps.len() / max_request_amount.max(1)).max(1);
    let mut samples = Vec::new();
    let mut i = 0;
    while i < timestamps.len() {
        samples.push(StarSample {
            date: timestamps[i].date_naive(),
            count: (i + 1) as u64,
        });
        i += step;
    }
    samples
}

/// Assemble samples from a sampled fetch: dense early pages contribute exact
/// positions chosen by the policy; every other page contributes a single
/// point at its first star with the approximate count `100 * (page - 1)`.
pub fn assemble_sampled(pages: &[FetchedPage], policy: &DensePolicy) -> Vec<StarSample> {
    let mut samples = Vec::new();
    for fetched in pages {
        if fetched.page < SPREAD_START {
            for (offset, ts) in fetched.timestamps.iter().enumerate() {
                let position = PER_PAGE * (fetched.page - 1) + offset + 1;
                if policy.keeps(position) {
                    samples.push(StarSample {
                        date: ts.date_naive(),
                        count: position as u64,
                    });
                }
            }
        } else if let Some(first) = fetched.timestamps.first() {
            samples.push(StarSample {
                date: first.date_naive(),
                count: (PER_PAGE * (fetched.page - 1)) as u64,
            });
        }
    }
    samples
}

/// Collapse to one sample per calendar day, last write wins, sorted by date.
/// The authoritative anchor is pushed last by the caller so it always
/// overrides an approximate same-day point.
pub fn dedupe_by_date(samples: Vec<StarSample>) -> Vec<StarSample> {
    let mut by_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for sample in samples {
        by_date.insert(sample.date, sample.count);
    }
    by_date
        .into_iter()
        .map(|(date, count)| StarSample { date, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_full_plan_below_budget() {
        let plan = SamplingPlan::build(7, 60);
        assert_eq!(plan.strategy, Strategy::Full);
        assert_eq!(plan.pages, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_full_plan_single_page() {
        let plan = SamplingPlan::build(1, 60);
        assert_eq!(plan.strategy, Strategy::Full);
        assert_eq!(plan.pages, vec![1]);
    }

    #[test]
    fn test_sampled_plan_always_includes_early_pages() {
        let plan = SamplingPlan::build(500, 60);
        assert_eq!(plan.strategy, Strategy::Sampled);
        assert!(plan.pages.starts_with(&[1, 2, 3]));
    }

    #[test]
    fn test_sampled_plan_bounded_sorted_in_range() {
        for page_count in [60, 61, 100, 500, 5000] {
            let plan = SamplingPlan::build(page_count, 60);
            assert!(plan.pages.len() <= 63, "page_count={page_count}");
            assert!(plan.pages.windows(2).all(|w| w[0] < w[1]));
            assert!(plan.pages.iter().all(|&p| p >= 1 && p <= page_count));
        }
    }

    #[test]
    fn test_sampled_plan_at_exact_budget_boundary() {
        // page_count == max_request_amount switches to sampling
        let plan = SamplingPlan::build(60, 60);
        assert_eq!(plan.strategy, Strategy::Sampled);
    }

    #[test]
    fn test_sampled_plan_spreads_toward_last_page() {
        // The final rounding step lands just past the range and is dropped,
        // so the deepest picked page sits close to (not at) page_count.
        let plan = SamplingPlan::build(1000, 60);
        let deepest = *plan.pages.last().unwrap();
        assert!(deepest > 900 && deepest < 1000, "deepest={deepest}");
    }

    #[test]
    fn test_dense_policy_membership() {
        let policy = DensePolicy::default();
        assert!(policy.keeps(1));
        assert!(policy.keeps(5));
        assert!(!policy.keeps(7));
        assert!(policy.keeps(100));
        assert!(!policy.keeps(105));
        assert!(policy.keeps(110));
        assert!(!policy.keeps(101));
    }

    #[test]
    fn test_assemble_full_steps_through_stars() {
        // 10 stars, budget 5 -> step 2 -> positions 1, 3, 5, 7, 9
        let page = FetchedPage {
            page: 1,
            timestamps: (1..=10).map(ts).collect(),
        };
        let samples = assemble_full(&[page], 5);
        let counts: Vec<u64> = samples.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![1, 3, 5, 7, 9]);
        assert_eq!(samples[0].date, date(1));
        assert_eq!(samples[4].date, date(9));
    }

    #[test]
    fn test_assemble_full_min_step_one() {
        // Fewer stars than budget: every star is a sample.
        let page = FetchedPage {
            page: 1,
            timestamps: (1..=3).map(ts).collect(),
        };
        let samples = assemble_full(&[page], 60);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].count, 3);
    }

    #[test]
    fn test_assemble_sampled_far_page_is_approximate() {
        let page = FetchedPage {
            page: 12,
            timestamps: vec![ts(20), ts(21)],
        };
        let samples = assemble_sampled(&[page], &DensePolicy::default());
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].count, 1100); // 100 * (12 - 1)
        assert_eq!(samples[0].date, date(20));
    }

    #[test]
    fn test_assemble_sampled_dense_pages_use_exact_positions() {
        let page1 = FetchedPage {
            page: 1,
            timestamps: (0..100).map(|i| ts(1 + i / 10)).collect(),
        };
        let page2 = FetchedPage {
            page: 2,
            timestamps: (0..100).map(|i| ts(11 + i / 10)).collect(),
        };
        let samples = assemble_sampled(&[page1, page2], &DensePolicy::default());
        let counts: Vec<u64> = samples.iter().map(|s| s.count).collect();
        // Page 1: 1, 5, 10, ..., 100. Page 2 (positions 101-200): 110, 120, ..., 200.
        assert_eq!(counts[0], 1);
        assert_eq!(counts[1], 5);
        assert!(counts.contains(&100));
        assert!(counts.contains(&110));
        assert!(!counts.contains(&101));
        assert!(!counts.contains(&105));
        assert_eq!(*counts.last().unwrap(), 200);
    }

    #[test]
    fn test_empty_first_page_yields_no_samples() {
        let page = FetchedPage {
            page: 1,
            timestamps: vec![],
        };
        assert!(assemble_full(&[page.clone()], 60).is_empty());
        assert!(assemble_sampled(&[page], &DensePolicy::default()).is_empty());
    }

    #[test]
    fn test_dedupe_last_write_wins() {
        let samples = vec![
            StarSample { date: date(2), count: 10 },
            StarSample { date: date(1), count: 1 },
            StarSample { date: date(2), count: 15 },
        ];
        let deduped = dedupe_by_date(samples);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], StarSample { date: date(1), count: 1 });
        assert_eq!(deduped[1], StarSample { date: date(2), count: 15 });
    }
}
