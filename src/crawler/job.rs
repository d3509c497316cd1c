use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::crawler::task::CrawlTask;
use crate::extract::Item;

/// Lifecycle of a job. Running is re-entered on resume with a non-1 cursor;
/// every run ends in one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Mutable run state of one job. Owns its immutable task; mutated only by the
/// orchestrator's worker; discarded when a new job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub task: CrawlTask,

    /// 1-based index of the page currently (or next) being processed
    pub cursor: u32,

    pub completed_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,

    /// Accumulated items, append-only, in page order
    pub items: Vec<Item>,

    pub status: JobStatus,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl CrawlJob {
    pub fn new(task: CrawlTask) -> Self {
        Self {
            task,
            cursor: 1,
            completed_pages: Vec::new(),
            failed_pages: Vec::new(),
            items: Vec::new(),
            status: JobStatus::Idle,
            last_error: None,
            started_at: Utc::now(),
        }
    }

    /// Rehydrate a job from a checkpoint; the cursor picks up where the
    /// saved run left off and previously collected items are kept. A page
    /// marked failed at or past the cursor was the in-flight page when the
    /// snapshot was taken, so it goes back to pending for another attempt.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        let cursor = checkpoint.cursor.clamp(1, checkpoint.task.max_pages);
        let mut failed_pages = checkpoint.failed_pages;
        failed_pages.retain(|&page| page < cursor);
        Self {
            task: checkpoint.task,
            cursor,
            completed_pages: checkpoint.completed_pages,
            failed_pages,
            items: checkpoint.items,
            status: JobStatus::Idle,
            last_error: None,
            started_at: Utc::now(),
        }
    }

    pub fn record_completed(&mut self, page: u32, items: Vec<Item>) {
        debug_assert!(!self.failed_pages.contains(&page));
        if !self.completed_pages.contains(&page) {
            self.completed_pages.push(page);
        }
        self.items.extend(items);
    }

    pub fn record_failed(&mut self, page: u32, error: String) {
        debug_assert!(!self.completed_pages.contains(&page));
        if !self.failed_pages.contains(&page) {
            self.failed_pages.push(page);
        }
        self.last_error = Some(error);
    }

    /// True once a page has been either completed or failed; resume uses
    /// this to avoid re-fetching.
    pub fn is_page_done(&self, page: u32) -> bool {
        self.completed_pages.contains(&page) || self.failed_pages.contains(&page)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            status: self.status,
            items_collected: self.items.len(),
            pages_completed: self.completed_pages.len(),
            pages_failed: self.failed_pages.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Final tally reported when a job reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub status: JobStatus,
    pub items_collected: usize,
    pub pages_completed: usize,
    pub pages_failed: usize,
    pub last_error: Option<String>,
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} items collected, {} pages completed, {} pages failed",
            self.status, self.items_collected, self.pages_completed, self.pages_failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::BackendKind;

    #[test]
    fn test_new_job_starts_at_cursor_one() {
        let job = CrawlJob::new(CrawlTask::new("https://x.test", BackendKind::Http, 5));
        assert_eq!(job.cursor, 1);
        assert_eq!(job.status, JobStatus::Idle);
        assert!(job.items.is_empty());
    }

    #[test]
    fn test_completed_and_failed_stay_disjoint() {
        let mut job = CrawlJob::new(CrawlTask::new("https://x.test", BackendKind::Http, 5));
        job.record_completed(1, Vec::new());
        job.record_failed(2, "boom".into());
        job.record_completed(3, Vec::new());

        assert_eq!(job.completed_pages, vec![1, 3]);
        assert_eq!(job.failed_pages, vec![2]);
        assert!(job.is_page_done(1));
        assert!(job.is_page_done(2));
        assert!(!job.is_page_done(4));
    }

    #[test]
    fn test_from_checkpoint_repends_the_in_flight_failed_page() {
        let mut job = CrawlJob::new(CrawlTask::new("https://x.test", BackendKind::Http, 5));
        job.record_completed(1, Vec::new());
        job.record_completed(2, Vec::new());
        job.record_failed(3, "network error".into());
        job.cursor = 3;

        let restored = CrawlJob::from_checkpoint(Checkpoint::from_job(&job));
        assert_eq!(restored.cursor, 3);
        assert_eq!(restored.completed_pages, vec![1, 2]);
        assert!(restored.failed_pages.is_empty());
        assert!(!restored.is_page_done(3));
    }

    #[test]
    fn test_duplicate_page_records_are_ignored() {
        let mut job = CrawlJob::new(CrawlTask::new("https://x.test", BackendKind::Http, 5));
        job.record_completed(1, Vec::new());
        job.record_completed(1, Vec::new());
        assert_eq!(job.completed_pages, vec![1]);
    }
}
