use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::crawler::job::CrawlJob;
use crate::crawler::task::CrawlTask;
use crate::extract::Item;

/// Durable snapshot of a job. At most one exists at a time; saves are
/// whole-file overwrites with no history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task: CrawlTask,
    pub cursor: u32,
    pub completed_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
    pub items: Vec<Item>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn from_job(job: &CrawlJob) -> Self {
        Self {
            task: job.task.clone(),
            cursor: job.cursor,
            completed_pages: job.completed_pages.clone(),
            failed_pages: job.failed_pages.clone(),
            items: job.items.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Whether this checkpoint belongs to a job over the same base URL.
    /// A mismatch is surfaced to the operator, never resolved silently.
    pub fn matches_base_url(&self, base_url: &str) -> bool {
        self.task.base_url == base_url
    }
}

/// Persists and restores job snapshots as a single JSON file.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the full job state, overwriting any prior checkpoint.
    /// Written to a sibling temp file and renamed, so readers see either the
    /// old or the new snapshot (best effort, not transactional).
    pub fn save(&self, job: &CrawlJob) -> Result<()> {
        let checkpoint = Checkpoint::from_job(job);
        let contents = serde_json::to_vec_pretty(&checkpoint)
            .context("Failed to serialize checkpoint")?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .context(format!("Failed to write checkpoint file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .context(format!("Failed to move checkpoint into place: {}", self.path.display()))?;

        debug!("Checkpoint saved to {} (cursor {})", self.path.display(), checkpoint.cursor);
        Ok(())
    }

    /// Loads the latest checkpoint. A missing, unreadable or corrupt file is
    /// treated as "no resumable state", never an error.
    pub fn load(&self) -> Option<Checkpoint> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!("No checkpoint at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(
                    "Checkpoint at {} could not be parsed, ignoring it: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Explicitly deletes the checkpoint. Unlike `load`, permission problems
    /// here are reported: the operator asked for the deletion.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Checkpoint cleared: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!(
                "Failed to delete checkpoint: {}",
                self.path.display()
            )),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::BackendKind;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("checkpoint.json"))
    }

    fn sample_job() -> CrawlJob {
        let task = CrawlTask::new("https://x.test", BackendKind::Http, 5);
        let mut job = CrawlJob::new(task);
        job.record_completed(1, Vec::new());
        job.record_completed(2, Vec::new());
        job.record_failed(3, "network error".into());
        job.cursor = 3;
        job
    }

    #[test]
    fn test_load_without_file_returns_none() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().is_none());
    }

    #[test]
    fn test_save_then_load_restores_progress() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job = sample_job();

        store.save(&job).unwrap();
        let checkpoint = store.load().unwrap();

        assert_eq!(checkpoint.cursor, 3);
        assert_eq!(checkpoint.completed_pages, vec![1, 2]);
        assert_eq!(checkpoint.failed_pages, vec![3]);
        assert_eq!(checkpoint.task.base_url, "https://x.test");
    }

    #[test]
    fn test_repeated_saves_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job = sample_job();

        store.save(&job).unwrap();
        let first = store.load().unwrap();
        store.save(&job).unwrap();
        let second = store.load().unwrap();

        assert_eq!(first.cursor, second.cursor);
        assert_eq!(first.completed_pages, second.completed_pages);
        assert_eq!(first.failed_pages, second.failed_pages);
        assert_eq!(first.items.len(), second.items.len());
    }

    #[test]
    fn test_corrupt_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"{ not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear_is_ok_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.clear().unwrap();

        store.save(&sample_job()).unwrap();
        assert!(store.exists());
        store.clear().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_base_url_mismatch_is_detectable() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample_job()).unwrap();

        let checkpoint = store.load().unwrap();
        assert!(checkpoint.matches_base_url("https://x.test"));
        assert!(!checkpoint.matches_base_url("https://other.test"));
    }
}
