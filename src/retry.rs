//! Bounded retry around a single outbound call.
//!
//! Every call site goes through [`RetryExecutor`] instead of carrying its
//! own loop. Only rate-limit responses are retried; the wait between
//! attempts comes from the governor, which reads the live quota state to
//! pick between the short transient pause and a full wait for reset.

use std::future::Future;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::governor::{epoch_seconds, RateLimitGovernor, SHORT_WAIT};

/// Source of the wait to apply after a rate-limited attempt.
pub trait RateLimitAdvisor {
    fn penalty(&self) -> impl Future<Output = Duration> + Send;
}

impl RateLimitAdvisor for RateLimitGovernor {
    /// A failed quota read means the state is unknown; assume scarce and
    /// take the short wait rather than hammering the API to find out.
    async fn penalty(&self) -> Duration {
        match self.snapshot().await {
            Ok(snap) => Self::decide(&snap, epoch_seconds()),
            Err(_) => SHORT_WAIT,
        }
    }
}

pub struct RetryExecutor<A> {
    advisor: A,
    max_retries: u32,
}

impl<A: RateLimitAdvisor> RetryExecutor<A> {
    pub fn new(advisor: A, max_retries: u32) -> Self {
        Self {
            advisor,
            max_retries,
        }
    }

    /// Run `op`, retrying up to `max_retries` times on a rate-limit error
    /// with a governor-mandated sleep before each retry. Any other error
    /// returns immediately; an exhausted budget returns the original
    /// rate-limit error.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ScrapeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = self.advisor.penalty().await;
                    eprintln!(
                        "\x1b[33m..\x1b[0m [{}] rate limited, retry {}/{} in {}s",
                        label,
                        attempt,
                        self.max_retries,
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Advisor that waits nothing and counts how often it was consulted.
    struct CountingAdvisor {
        consulted: Arc<AtomicU32>,
    }

    impl RateLimitAdvisor for CountingAdvisor {
        async fn penalty(&self) -> Duration {
            self.consulted.fetch_add(1, Ordering::SeqCst);
            Duration::ZERO
        }
    }

    fn executor(max_retries: u32) -> (RetryExecutor<CountingAdvisor>, Arc<AtomicU32>) {
        let consulted = Arc::new(AtomicU32::new(0));
        let advisor = CountingAdvisor {
            consulted: consulted.clone(),
        };
        (RetryExecutor::new(advisor, max_retries), consulted)
    }

    fn rate_limited() -> ScrapeError {
        ScrapeError::RateLimited { status: 403 }
    }

    #[tokio::test]
    async fn test_two_rate_limits_then_success() {
        let (exec, consulted) = executor(3);
        let calls = AtomicU32::new(0);

        let result = exec
            .execute("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(consulted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_original_error() {
        let (exec, consulted) = executor(3);
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = exec
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::RateLimited { status: 403 })));
        // 1 initial attempt + 3 retries, each retry preceded by one wait
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(consulted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_is_not_retried() {
        let (exec, consulted) = executor(3);
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = exec
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScrapeError::NotFound("owner/repo".into())) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(consulted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_needs_no_advisor() {
        let (exec, consulted) = executor(3);
        let result = exec.execute("test", || async { Ok::<_, ScrapeError>(7u32) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(consulted.load(Ordering::SeqCst), 0);
    }
}
