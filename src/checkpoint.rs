//! Durable progress for a batch run: three newline-delimited logs of
//! repository full names, written through after every outcome so a killed
//! process loses at most the repository it was working on.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REMAINING_FILE: &str = "remaining-repos.txt";
pub const COMPLETED_FILE: &str = "completed-repos.txt";
pub const FAILED_FILE: &str = "failed-repos.txt";

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// An existing log could not be read back. Progress is never silently
    /// dropped; the operator must pass --reset to start over.
    #[error("checkpoint file {} is corrupt ({reason}); re-run with --reset to discard progress", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three disjoint name sets of one run. Their union always equals the
/// original input set plus any names added to it since the last run.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    remaining: Vec<String>,
    completed: Vec<String>,
    failed: Vec<String>,
}

impl CheckpointStore {
    /// Load existing logs from `dir`, or start empty when none exist.
    pub fn load(dir: &Path) -> Result<Self, CheckpointError> {
        Ok(Self {
            dir: dir.to_path_buf(),
            remaining: read_log(&dir.join(REMAINING_FILE))?,
            completed: read_log(&dir.join(COMPLETED_FILE))?,
            failed: read_log(&dir.join(FAILED_FILE))?,
        })
    }

    /// Remove all three logs, discarding any recorded progress.
    pub fn reset(dir: &Path) -> std::io::Result<()> {
        for file in [REMAINING_FILE, COMPLETED_FILE, FAILED_FILE] {
            let path = dir.join(file);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Merge the authoritative input list with recorded progress and return
    /// the names this run must process: everything still remaining, every
    /// previous failure (always retried), and every name not seen before.
    /// The failed log is cleared once its contents are re-queued.
    pub fn reconcile(&mut self, authoritative: &[String]) -> Result<Vec<String>, CheckpointError> {
        let known: HashSet<&str> = self
            .remaining
            .iter()
            .chain(&self.completed)
            .chain(&self.failed)
            .map(String::as_str)
            .collect();

        let mut queued: HashSet<&str> = HashSet::new();
        let mut to_process: Vec<String> = Vec::new();
        for name in self.remaining.iter().chain(&self.failed) {
            if queued.insert(name.as_str()) {
                to_process.push(name.clone());
            }
        }
        for name in authoritative {
            if !known.contains(name.as_str()) && queued.insert(name.as_str()) {
                to_process.push(name.clone());
            }
        }

        self.remaining = to_process.clone();
        self.failed.clear();
        write_log(&self.dir.join(REMAINING_FILE), &self.remaining)?;
        write_log(&self.dir.join(FAILED_FILE), &self.failed)?;
        Ok(to_process)
    }

    pub fn record_success(&mut self, name: &str) -> Result<(), CheckpointError> {
        self.completed.push(name.to_string());
        append_line(&self.dir.join(COMPLETED_FILE), name)?;
        self.drop_remaining(name)
    }

    pub fn record_failure(&mut self, name: &str) -> Result<(), CheckpointError> {
        self.failed.push(name.to_string());
        append_line(&self.dir.join(FAILED_FILE), name)?;
        self.drop_remaining(name)
    }

    fn drop_remaining(&mut self, name: &str) -> Result<(), CheckpointError> {
        self.remaining.retain(|n| n != name);
        write_log(&self.dir.join(REMAINING_FILE), &self.remaining)?;
        Ok(())
    }

    /// Write all three logs. The remaining log is deleted once empty; its
    /// absence is the marker that the run fully completed.
    pub fn flush(&self) -> Result<(), CheckpointError> {
        write_log(&self.dir.join(COMPLETED_FILE), &self.completed)?;
        write_log(&self.dir.join(FAILED_FILE), &self.failed)?;
        let remaining_path = self.dir.join(REMAINING_FILE);
        if self.remaining.is_empty() {
            if remaining_path.exists() {
                fs::remove_file(remaining_path)?;
            }
        } else {
            write_log(&remaining_path, &self.remaining)?;
        }
        Ok(())
    }

    pub fn remaining(&self) -> &[String] {
        &self.remaining
    }
}

fn read_log(path: &Path) -> Result<Vec<String>, CheckpointError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|_| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason: "not valid UTF-8".to_string(),
    })?;
    let mut names = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Every entry is an owner/name pair; anything else is a truncated
        // or foreign write.
        if !line.contains('/') {
            return Err(CheckpointError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unexpected entry {:?}", line),
            });
        }
        names.push(line.to_string());
    }
    Ok(names)
}

fn write_log(path: &Path, names: &[String]) -> Result<(), CheckpointError> {
    let mut body = names.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body)?;
    Ok(())
}

fn append_line(path: &Path, name: &str) -> Result<(), CheckpointError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_trip_preserves_to_process() {
        let dir = tempdir().unwrap();
        let input = names(&["o/a", "o/b", "o/c"]);

        let mut store = CheckpointStore::load(dir.path()).unwrap();
        let to_process = store.reconcile(&input).unwrap();
        assert_eq!(to_process, input);

        store.record_success("o/c").unwrap();
        store.flush().unwrap();

        // Reload: a and b still pending, no new names in the input.
        let mut reloaded = CheckpointStore::load(dir.path()).unwrap();
        let to_process = reloaded.reconcile(&input).unwrap();
        assert_eq!(to_process, names(&["o/a", "o/b"]));
    }

    #[test]
    fn test_failed_names_are_requeued_and_log_cleared() {
        let dir = tempdir().unwrap();
        let input = names(&["o/a", "o/b"]);

        let mut store = CheckpointStore::load(dir.path()).unwrap();
        store.reconcile(&input).unwrap();
        store.record_success("o/a").unwrap();
        store.record_failure("o/b").unwrap();
        store.flush().unwrap();

        let mut reloaded = CheckpointStore::load(dir.path()).unwrap();
        let to_process = reloaded.reconcile(&input).unwrap();
        assert_eq!(to_process, names(&["o/b"]));
        // Re-queued failures live in remaining now; the failed log is empty.
        assert_eq!(read_log(&dir.path().join(FAILED_FILE)).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_new_names_join_the_queue() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::load(dir.path()).unwrap();
        store.reconcile(&names(&["o/a"])).unwrap();
        store.record_success("o/a").unwrap();
        store.flush().unwrap();

        let mut reloaded = CheckpointStore::load(dir.path()).unwrap();
        let to_process = reloaded.reconcile(&names(&["o/a", "o/new"])).unwrap();
        assert_eq!(to_process, names(&["o/new"]));
    }

    #[test]
    fn test_completed_run_leaves_no_remaining_file() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::load(dir.path()).unwrap();
        store.reconcile(&names(&["o/a"])).unwrap();
        assert!(dir.path().join(REMAINING_FILE).exists());

        store.record_success("o/a").unwrap();
        store.flush().unwrap();
        assert!(!dir.path().join(REMAINING_FILE).exists());

        // A rerun with the same input finds nothing to do.
        let mut rerun = CheckpointStore::load(dir.path()).unwrap();
        let to_process = rerun.reconcile(&names(&["o/a"])).unwrap();
        assert!(to_process.is_empty());
        assert!(rerun.remaining().is_empty());
    }

    #[test]
    fn test_interrupted_run_resumes_where_it_stopped() {
        let dir = tempdir().unwrap();
        let input = names(&["o/a", "o/b", "o/c"]);

        let mut store = CheckpointStore::load(dir.path()).unwrap();
        store.reconcile(&input).unwrap();
        store.record_success("o/a").unwrap();
        // Process dies here: no flush. The write-through logs must carry
        // the full picture on their own.
        drop(store);

        let mut resumed = CheckpointStore::load(dir.path()).unwrap();
        let to_process = resumed.reconcile(&input).unwrap();
        assert_eq!(to_process, names(&["o/b", "o/c"]));
    }

    #[test]
    fn test_corrupt_log_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(REMAINING_FILE), b"o/a\n\xff\xfe broken").unwrap();
        let err = CheckpointStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_truncated_entry_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(COMPLETED_FILE), "o/a\nnot-a-repo-name\n").unwrap();
        let err = CheckpointStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_reset_discards_all_logs() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::load(dir.path()).unwrap();
        store.reconcile(&names(&["o/a"])).unwrap();
        store.record_failure("o/a").unwrap();
        store.flush().unwrap();

        CheckpointStore::reset(dir.path()).unwrap();
        assert!(!dir.path().join(REMAINING_FILE).exists());
        assert!(!dir.path().join(FAILED_FILE).exists());

        let mut fresh = CheckpointStore::load(dir.path()).unwrap();
        assert_eq!(fresh.reconcile(&names(&["o/a"])).unwrap(), names(&["o/a"]));
    }
}
