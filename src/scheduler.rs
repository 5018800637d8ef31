//! Sequential batch drive over a repository list.
//!
//! Repositories are processed one at a time with a fixed pause between
//! them; GitHub's abuse detection reacts to bursts even when formal quota
//! remains, so the only concurrency anywhere is page fetching inside a
//! single repository. Progress is written through to the checkpoint after
//! every repository, and both normal completion and an interrupt funnel
//! into the same single flush.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::checkpoint::CheckpointStore;
use crate::config::ScrapeConfig;
use crate::db::{HistoryStore, RepoScrapeJob};
use crate::error::ScrapeError;
use crate::governor::{epoch_seconds, RateLimitGovernor};
use crate::history::{HistoryAssembler, StarSource};
use crate::retry::RateLimitAdvisor;

/// Pre-batch quota gate. Consulted before each batch so an exhausted window
/// is waited out deliberately instead of being discovered through a 403.
pub trait QuotaGate {
    /// `Ok(None)` to proceed, `Ok(Some(wait))` to sleep first. An error here
    /// is fatal for the run: resuming blind risks double-charging quota.
    fn clearance_wait(&self) -> impl Future<Output = Result<Option<Duration>, ScrapeError>> + Send;
}

impl QuotaGate for RateLimitGovernor {
    async fn clearance_wait(&self) -> Result<Option<Duration>, ScrapeError> {
        let snap = self.snapshot().await?;
        if !snap.is_exhausted() {
            return Ok(None);
        }
        let wait = Self::decide(&snap, epoch_seconds());
        let reset_time = chrono::DateTime::from_timestamp(snap.reset as i64, 0)
            .map(|dt| dt.with_timezone(&chrono::Local).format("%H:%M").to_string())
            .unwrap_or_else(|| "??:??".to_string());
        eprintln!(
            "\x1b[33m..\x1b[0m Quota exhausted ({}/{} used), waiting {}m{}s for reset (at {})",
            snap.used,
            snap.limit,
            wait.as_secs() / 60,
            wait.as_secs() % 60,
            reset_time
        );
        Ok(Some(wait))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct BatchScheduler<S, A, G> {
    assembler: HistoryAssembler<S, A>,
    gate: G,
    store: HistoryStore,
    checkpoint: CheckpointStore,
    config: ScrapeConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S: StarSource, A: RateLimitAdvisor, G: QuotaGate> BatchScheduler<S, A, G> {
    pub fn new(
        assembler: HistoryAssembler<S, A>,
        gate: G,
        store: HistoryStore,
        checkpoint: CheckpointStore,
        config: ScrapeConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            assembler,
            gate,
            store,
            checkpoint,
            config,
            shutdown,
        }
    }

    /// Process every name this run owes, then flush the checkpoint. The
    /// flush happens exactly once whether the run completed, was
    /// interrupted, or died on a fatal error.
    pub async fn run(&mut self, names: &[String]) -> Result<BatchOutcome> {
        let result = self.drive(names).await;
        self.shutdown()?;
        let outcome = result?;
        eprintln!(
            "\x1b[32mok\x1b[0m Batch done: {} scraped, {} failed, {} skipped",
            outcome.successful, outcome.failed, outcome.skipped
        );
        Ok(outcome)
    }

    /// Flush recorded progress. Serves both the normal-completion path and
    /// the interrupt path.
    pub fn shutdown(&mut self) -> Result<()> {
        self.checkpoint.flush()?;
        Ok(())
    }

    async fn drive(&mut self, names: &[String]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        let to_process = self.checkpoint.reconcile(names)?;
        if to_process.is_empty() {
            eprintln!("\x1b[32mok\x1b[0m Nothing to do, all repositories already scraped");
            return Ok(outcome);
        }

        let (jobs, unresolved) = self.store.resolve_jobs(&to_process)?;
        for name in &unresolved {
            eprintln!(
                "\x1b[33m..\x1b[0m Skipping {} (not in the local store, run `startrail load` first)",
                name
            );
            // Skipped names land in the completed log so they are not
            // re-queued forever; they are not failures.
            self.checkpoint.record_success(name)?;
        }
        outcome.skipped = unresolved.len();

        if jobs.is_empty() {
            return Ok(outcome);
        }

        let plan = RateLimitGovernor::estimate_batch(
            jobs.len(),
            self.config.max_calls_per_hour,
            self.config.estimated_calls_per_repo,
        );
        eprintln!(
            "\x1b[36m..\x1b[0m Scraping {} repositories in {} batches (~{}/hour, roughly {}h)",
            jobs.len(),
            plan.total_batches,
            plan.items_per_hour,
            plan.total_batches
        );

        let total = jobs.len();
        let mut done = 0;
        let mut start = 0;
        'batches: for (batch_no, &size) in plan.batch_sizes.iter().enumerate() {
            if self.is_shutdown() {
                break;
            }
            if plan.total_batches > 1 {
                eprintln!(
                    "\x1b[36m..\x1b[0m Batch {}/{} ({} repositories)",
                    batch_no + 1,
                    plan.total_batches,
                    size
                );
            }
            if let Some(wait) = self
                .gate
                .clearance_wait()
                .await
                .context("Could not read rate limit before starting a batch")?
            {
                self.pace(wait).await;
            }

            for job in &jobs[start..start + size] {
                if self.is_shutdown() {
                    break 'batches;
                }
                self.process_one(job, &mut outcome).await?;
                done += 1;
                if done < total {
                    self.pace(self.config.inter_call_delay).await;
                }
            }
            start += size;
        }

        if self.is_shutdown() {
            eprintln!(
                "\x1b[33m..\x1b[0m Interrupted with {} repositories left, progress saved",
                self.checkpoint.remaining().len()
            );
        }

        Ok(outcome)
    }

    /// Scrape one repository and record its outcome. A per-repository
    /// failure is logged and checkpointed, never fatal for the batch.
    async fn process_one(&mut self, job: &RepoScrapeJob, outcome: &mut BatchOutcome) -> Result<()> {
        match self.assembler.fetch_history(&job.full_name).await {
            Ok(samples) => {
                self.store.replace_history(job.repo_id, &samples)?;
                self.checkpoint.record_success(&job.full_name)?;
                outcome.successful += 1;
                eprintln!(
                    "  \x1b[32mok\x1b[0m {} ({} points)",
                    job.full_name,
                    samples.len()
                );
            }
            Err(e) => {
                self.checkpoint.record_failure(&job.full_name)?;
                outcome.failed += 1;
                eprintln!("  \x1b[31mx\x1b[0m {}: {}", job.full_name, e);
            }
        }
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep that wakes early on shutdown, so an interrupt never sits out a
    /// multi-minute governor wait.
    async fn pace(&self, wait: Duration) {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = async {
                loop {
                    if shutdown.changed().await.is_err() {
                        // Sender gone: shutdown can never fire, sleep out the wait.
                        std::future::pending::<()>().await;
                    }
                    if *shutdown.borrow() {
                        return;
                    }
                }
            } => {}
        }
    }
}
