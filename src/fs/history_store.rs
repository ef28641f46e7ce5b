//! Failure history persistence.
//!
//! The history is one JSON document, read once at the start of a run and
//! replaced wholesale at the end. Reads take a shared fs2 lock, writes go
//! through a temp file and an atomic rename under an exclusive lock.
//! Concurrent runs are expected to be serialized by the caller; the locks
//! only keep an accidental overlap from corrupting the file.

use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::models::HistoryData;

/// Load/save boundary for the durable failure history.
pub trait HistoryStore {
    /// An empty history when nothing was persisted yet; a missing, empty,
    /// or unreadable file is never an error.
    fn load(&self) -> Result<HistoryData>;

    fn save(&self, history: &HistoryData) -> Result<()>;
}

/// JSON file-backed history store.
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl HistoryStore for JsonHistoryStore {
    fn load(&self) -> Result<HistoryData> {
        if !self.path.exists() {
            tracing::info!("No previous failure history found, starting fresh");
            return Ok(HistoryData::empty());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;
        file.lock_shared()
            .with_context(|| format!("Failed to lock history file: {}", self.path.display()))?;

        let mut content = String::new();
        let mut reader = &file;
        reader
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read history file: {}", self.path.display()))?;

        if content.trim().is_empty() {
            tracing::info!("History file exists but is empty, starting fresh");
            return Ok(HistoryData::empty());
        }

        match serde_json::from_str(&content) {
            Ok(history) => {
                tracing::info!(path = %self.path.display(), "Loaded failure history");
                Ok(history)
            }
            Err(err) => {
                // corruption degrades to first-run behavior, never fatal
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Failed to parse failure history, starting fresh"
                );
                Ok(HistoryData::empty())
            }
        }
    }

    fn save(&self, history: &HistoryData) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        // Hold an exclusive lock on the target for the whole write so a
        // concurrent reader never sees a half-written document.
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock history file: {}", self.path.display()))?;

        let json = serde_json::to_string_pretty(history)
            .context("Failed to serialize failure history")?;

        let temp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        fs::write(temp.path(), json)
            .with_context(|| format!("Failed to write {}", temp.path().display()))?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace history file: {}", self.path.display()))?;

        tracing::info!(
            path = %self.path.display(),
            failures = history.failures.len(),
            tested_commits = history.tested_commits.len(),
            "Saved failure history"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::Utc;
    use tempfile::TempDir;

    use crate::models::{FailureStatus, TrackedFailure};

    fn sample_history() -> HistoryData {
        let tracked = TrackedFailure {
            test_class_name: "org.acme.ATest".to_string(),
            test_method_name: "testA".to_string(),
            module_path: PathBuf::from("/suite/m1"),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            status: FailureStatus::Existing,
            upstream_commit: Some("abc123".to_string()),
            upstream_pull_request: Some("42".to_string()),
        };
        HistoryData {
            last_run: Some(Utc::now()),
            last_tested_commit: Some("abc123".to_string()),
            failures: vec![tracked],
            tested_commits: vec!["abc123".to_string(), "def456".to_string()],
        }
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let temp = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(temp.path().join("failure-history.json"));

        let history = sample_history();
        store.save(&history).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.failures, history.failures);
        assert_eq!(loaded.tested_commits, history.tested_commits);
        assert_eq!(loaded.last_tested_commit, history.last_tested_commit);
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let temp = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(temp.path().join("nope.json"));
        let loaded = store.load().unwrap();
        assert_eq!(loaded, HistoryData::empty());
    }

    #[test]
    fn test_empty_file_is_empty_history() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("failure-history.json");
        fs::write(&path, "").unwrap();

        let loaded = JsonHistoryStore::new(&path).load().unwrap();
        assert_eq!(loaded, HistoryData::empty());
    }

    #[test]
    fn test_corrupt_file_is_empty_history() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("failure-history.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = JsonHistoryStore::new(&path).load().unwrap();
        assert_eq!(loaded, HistoryData::empty());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/failure-history.json");

        let store = JsonHistoryStore::new(&path);
        store.save(&sample_history()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_overwrites_previous_content() {
        let temp = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(temp.path().join("failure-history.json"));

        store.save(&sample_history()).unwrap();
        store.save(&HistoryData::empty()).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.failures.is_empty());
    }
}
