mod checkpoint;
mod config;
mod db;
mod error;
mod github;
mod governor;
mod history;
mod pagination;
mod retry;
mod sampling;
mod scheduler;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::sync::watch;

use checkpoint::CheckpointStore;
use config::{Config, ScrapeConfig};
use db::HistoryStore;
use error::ScrapeError;
use github::GitHubClient;
use governor::RateLimitGovernor;
use history::HistoryAssembler;
use retry::RetryExecutor;
use scheduler::BatchScheduler;

#[derive(Parser)]
#[command(name = "startrail")]
#[command(about = "Reconstructs GitHub star-count history under API rate limits")]
#[command(after_help = "\x1b[36mExamples:\x1b[0m
  startrail history rust-lang/rust     # One repository's star history
  startrail load repos.txt             # Register repo names in the local store
  startrail batch repos.txt            # Checkpointed scrape of the whole list")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one repository's star history
    History {
        /// Repository full name (e.g., "rust-lang/rust")
        repo: String,

        /// Print the series as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Request budget for this repository (pages of 100 stars)
        #[arg(long, default_value = "60")]
        max_requests: usize,
    },

    /// Load repo names from file into the local store (no GitHub fetch)
    Load {
        /// Path to file containing repo names (one per line)
        file: String,
    },

    /// Run the checkpointed batch scraper over a repo list
    Batch {
        /// Path to file containing repo names (one per line)
        file: String,

        /// Discard checkpoint state and start over
        #[arg(long)]
        reset: bool,

        /// Number of repos to process (default: all)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Pause between repositories in milliseconds
        #[arg(long, default_value = "2500")]
        delay_ms: u64,
    },

    /// Check GitHub API rate limit
    RateLimit,

    /// Show local store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let token = Config::github_token();
    let client = GitHubClient::new(token.clone());

    match cli.command {
        Commands::History {
            repo,
            json,
            max_requests,
        } => {
            warn_if_unauthenticated(&token);
            fetch_one(&client, &repo, json, max_requests).await
        }
        Commands::Load { file } => {
            let store = HistoryStore::open()?;
            load_repo_stubs(&store, &file)
        }
        Commands::Batch {
            file,
            reset,
            limit,
            delay_ms,
        } => {
            warn_if_unauthenticated(&token);
            run_batch(client, &file, reset, limit, delay_ms).await
        }
        Commands::RateLimit => check_rate_limit(&client).await,
        Commands::Stats => show_stats(),
    }
}

fn warn_if_unauthenticated(token: &Option<String>) {
    if token.is_none() {
        eprintln!("\x1b[33m..\x1b[0m No GitHub token found. Rate limit: 60 req/hour");
        eprintln!("  Set GITHUB_TOKEN or run: gh auth login");
    }
}

/// Fetch and print a single repository's history
async fn fetch_one(client: &GitHubClient, repo: &str, json: bool, max_requests: usize) -> Result<()> {
    let config = ScrapeConfig {
        max_request_amount: max_requests,
        ..ScrapeConfig::default()
    };
    let governor = RateLimitGovernor::new(client.clone());
    let retry = RetryExecutor::new(governor, config.max_retries);
    let assembler = HistoryAssembler::new(client.clone(), retry, &config);

    eprintln!("\x1b[36m..\x1b[0m Fetching star history for {}", repo);
    let samples = match assembler.fetch_history(repo).await {
        Ok(samples) => samples,
        Err(e @ (ScrapeError::NotFound(_) | ScrapeError::NoStargazers(_))) => {
            eprintln!("\x1b[31mx\x1b[0m {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
    } else {
        println!("{:<12} {:>9}", "date", "stars");
        for sample in &samples {
            println!("{:<12} {:>9}", sample.date, sample.count);
        }
    }
    eprintln!("\x1b[32mok\x1b[0m {} points", samples.len());
    Ok(())
}

/// Load repo name stubs from a file into the store, no API calls
fn load_repo_stubs(store: &HistoryStore, file_path: &str) -> Result<()> {
    let all_repos = read_repo_list(file_path, None)?;

    let total = all_repos.len();
    eprintln!(
        "\x1b[36m..\x1b[0m Loading {} repo names from {} (no GitHub API calls)",
        total, file_path
    );

    if total == 0 {
        eprintln!("\x1b[33m..\x1b[0m No repos to load");
        return Ok(());
    }

    let (inserted, skipped) = store.add_repo_stubs_bulk(&all_repos)?;
    eprintln!(
        "\x1b[32mok\x1b[0m Loaded {} new repos ({} already existed)",
        inserted, skipped
    );
    Ok(())
}

/// Run the checkpointed batch scraper
async fn run_batch(
    client: GitHubClient,
    file_path: &str,
    reset: bool,
    limit: Option<usize>,
    delay_ms: u64,
) -> Result<()> {
    let names = read_repo_list(file_path, limit)?;
    eprintln!(
        "\x1b[36m..\x1b[0m {} repositories listed in {}",
        names.len(),
        file_path
    );

    let run_dir = std::env::current_dir()?;
    if reset {
        CheckpointStore::reset(&run_dir)?;
        eprintln!("\x1b[36m..\x1b[0m Checkpoint cleared, starting fresh");
    }
    let checkpoint = CheckpointStore::load(&run_dir)?;
    let store = HistoryStore::open()?;

    // The signal handler only flips a flag; the scheduler stops between
    // repositories and flushes through its normal shutdown path.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n\x1b[33m..\x1b[0m Interrupt received, saving progress");
            let _ = shutdown_tx.send(true);
        }
    });

    let config = ScrapeConfig {
        inter_call_delay: Duration::from_millis(delay_ms),
        ..ScrapeConfig::default()
    };
    let governor = RateLimitGovernor::new(client.clone());
    let retry = RetryExecutor::new(governor.clone(), config.max_retries);
    let assembler = HistoryAssembler::new(client, retry, &config);
    let mut scheduler =
        BatchScheduler::new(assembler, governor, store, checkpoint, config, shutdown_rx);

    scheduler.run(&names).await?;
    Ok(())
}

async fn check_rate_limit(client: &GitHubClient) -> Result<()> {
    let rate = client.fetch_rate_limit().await?;

    let reset_time = chrono::DateTime::from_timestamp(rate.reset as i64, 0)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());

    eprintln!("\x1b[36mGitHub API Rate Limit\x1b[0m\n");
    eprintln!("  \x1b[90mLimit:\x1b[0m     {}/hour", rate.limit);
    eprintln!("  \x1b[90mUsed:\x1b[0m      {}", rate.used);
    eprintln!("  \x1b[90mRemaining:\x1b[0m {}", rate.remaining);
    eprintln!("  \x1b[90mResets at:\x1b[0m {}", reset_time);

    Ok(())
}

fn show_stats() -> Result<()> {
    let store = HistoryStore::open()?;
    let stats = store.history_stats()?;

    eprintln!("\x1b[36mLocal store\x1b[0m\n");
    eprintln!("  \x1b[90mRepositories:\x1b[0m {}", stats.repos);
    eprintln!("  \x1b[90mWith history:\x1b[0m {}", stats.with_history);
    eprintln!("  \x1b[90mPoints:\x1b[0m       {}", stats.points);

    Ok(())
}

/// Read a newline-delimited repo list, dropping blanks, comments, and
/// anything that is not an owner/name pair
fn read_repo_list(file_path: &str, limit: Option<usize>) -> Result<Vec<String>> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open(file_path)?;
    let reader = BufReader::new(file);

    let repos: Vec<String> = reader
        .lines()
        .filter_map(|l| l.ok())
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#') && l.contains('/'))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    Ok(repos)
}
