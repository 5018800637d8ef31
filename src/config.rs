use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

pub struct Config;

impl Config {
    /// Get the data directory path
    fn data_dir() -> Result<PathBuf> {
        ProjectDirs::from("dev", "startrail", "startrail")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("Could not determine data directory")
    }

    /// Get the database file path
    pub fn db_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("history.db"))
    }

    /// Get GitHub token from environment or gh CLI config
    pub fn github_token() -> Option<String> {
        // First try environment variable
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                return Some(token);
            }
        }

        // Try GH_TOKEN (used by gh CLI)
        if let Ok(token) = std::env::var("GH_TOKEN") {
            if !token.is_empty() {
                return Some(token);
            }
        }

        // Try to get from gh CLI config
        if let Ok(output) = std::process::Command::new("gh")
            .args(["auth", "token"])
            .output()
        {
            if output.status.success() {
                let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !token.is_empty() {
                    return Some(token);
                }
            }
        }

        None
    }
}

/// Tunables for one scraping run.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Request budget per repository (pages of 100 stargazers).
    pub max_request_amount: usize,
    /// Conservative hourly call ceiling, under the 5000/hr authenticated limit.
    pub max_calls_per_hour: usize,
    /// Rough calls spent per repository, used for advisory batch sizing.
    pub estimated_calls_per_repo: usize,
    /// Pause between repositories, even with quota to spare (abuse detection
    /// triggers on bursts, not just totals).
    pub inter_call_delay: Duration,
    /// Concurrent page fetches within one repository. Never applies across
    /// repositories.
    pub page_concurrency: usize,
    /// Retries per call on a rate-limit response.
    pub max_retries: u32,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_request_amount: 60,
            max_calls_per_hour: 4000,
            estimated_calls_per_repo: 40,
            inter_call_delay: Duration::from_millis(2500),
            page_concurrency: 3,
            max_retries: 3,
        }
    }
}
