use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::sampling::StarSample;

/// One resolved unit of batch work. The id comes from the store, never from
/// the name itself.
#[derive(Debug, Clone)]
pub struct RepoScrapeJob {
    pub full_name: String,
    pub repo_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryStats {
    pub repos: usize,
    pub with_history: usize,
    pub points: usize,
}

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub fn open() -> Result<Self> {
        let db_path = Config::db_path()?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // Retry instead of failing fast if another CLI instance holds the lock
        conn.busy_timeout(std::time::Duration::from_secs(30))?;

        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database for testing
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS repos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                added_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE TABLE IF NOT EXISTS star_history (
                repo_id INTEGER NOT NULL REFERENCES repos(id),
                date TEXT NOT NULL,
                count INTEGER NOT NULL,
                PRIMARY KEY (repo_id, date)
            );",
        )?;
        Ok(())
    }

    /// Insert repo name stubs, skipping names already present
    /// (case-insensitive). Returns (inserted, skipped).
    pub fn add_repo_stubs_bulk(&self, names: &[String]) -> Result<(usize, usize)> {
        if names.is_empty() {
            return Ok((0, 0));
        }

        // Use a single transaction for all inserts
        self.conn.execute("BEGIN IMMEDIATE", [])?;

        let mut inserted = 0;
        for name in names {
            inserted += self.conn.execute(
                "INSERT OR IGNORE INTO repos (full_name) VALUES (?1)",
                params![name],
            )?;
        }

        self.conn.execute("COMMIT", [])?;
        Ok((inserted, names.len() - inserted))
    }

    /// Look up a repository's internal id by full name (case-insensitive).
    pub fn lookup_id(&self, full_name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM repos WHERE full_name = ?1",
                params![full_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Split names into jobs the store knows and names it does not.
    pub fn resolve_jobs(&self, names: &[String]) -> Result<(Vec<RepoScrapeJob>, Vec<String>)> {
        let mut jobs = Vec::new();
        let mut unresolved = Vec::new();
        for name in names {
            match self.lookup_id(name)? {
                Some(repo_id) => jobs.push(RepoScrapeJob {
                    full_name: name.clone(),
                    repo_id,
                }),
                None => unresolved.push(name.clone()),
            }
        }
        Ok((jobs, unresolved))
    }

    /// Replace a repository's stored point series with a fresh one, in a
    /// single transaction so readers never see a half-written series.
    pub fn replace_history(&self, repo_id: i64, samples: &[StarSample]) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", [])?;
        self.conn
            .execute("DELETE FROM star_history WHERE repo_id = ?1", params![repo_id])?;
        {
            let mut stmt = self
                .conn
                .prepare("INSERT INTO star_history (repo_id, date, count) VALUES (?1, ?2, ?3)")?;
            for sample in samples {
                stmt.execute(params![repo_id, sample.date.to_string(), sample.count as i64])?;
            }
        }
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Load a repository's stored series, oldest first.
    #[allow(dead_code)]
    pub fn get_history(&self, repo_id: i64) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, count FROM star_history WHERE repo_id = ?1 ORDER BY date")?;
        let rows = stmt
            .query_map(params![repo_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn history_stats(&self) -> Result<HistoryStats> {
        let repos: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM repos", [], |row| row.get(0))?;
        let with_history: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT repo_id) FROM star_history",
            [],
            |row| row.get(0),
        )?;
        let points: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM star_history", [], |row| row.get(0))?;
        Ok(HistoryStats {
            repos: repos as usize,
            with_history: with_history as usize,
            points: points as usize,
        })
    }
}
