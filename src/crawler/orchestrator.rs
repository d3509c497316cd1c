use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::AlertEngine;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::cli::config::{AppConfig, FetchSettings};
use crate::crawler::job::{CrawlJob, JobStatus, JobSummary};
use crate::crawler::pagination::next_page_url;
use crate::crawler::retry::{run_with_retry, RetryError, RetryPolicy};
use crate::crawler::task::CrawlTask;
use crate::extract;
use crate::fetch::{create_backend, FetchBackend};

/// Status updates emitted while a job runs. Delivery is fire-and-forget; a
/// dropped receiver never stalls the crawl.
#[derive(Debug, Clone)]
pub enum JobEvent {
    PageStarted { page: u32, url: String },
    PageCompleted { page: u32, items: usize },
    PageFailed { page: u32, error: String },
    Retrying { page: u32, attempt: u32, error: String },
    CheckpointSaved { cursor: u32 },
    Finished { summary: JobSummary },
}

/// Drives one job at a time through its page loop: pagination, per-page retry,
/// extraction, checkpointing and teardown. Single-threaded by construction,
/// pages are fetched strictly in order.
pub struct Orchestrator {
    retry: RetryPolicy,
    fetch: FetchSettings,
    store: CheckpointStore,
    checkpoint_every: Option<u32>,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
    alerts: Option<AlertEngine>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig, cancel: CancellationToken) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            fetch: config.fetch.clone(),
            store: CheckpointStore::new(config.checkpoint.resolved_path()),
            checkpoint_every: config.checkpoint.every_pages,
            cancel,
            events: None,
            alerts: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_alerts(mut self, alerts: AlertEngine) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Runs a fresh job from page 1 and returns its final state, items
    /// included.
    pub async fn start(&mut self, task: CrawlTask) -> Result<CrawlJob> {
        info!(
            "Starting crawl of {} ({} pages, {} backend)",
            task.base_url, task.max_pages, task.backend
        );
        let job = CrawlJob::new(task);
        let backend = self.setup_backend(&job).await?;
        self.run_with_backend(job, backend).await
    }

    /// Resumes a job from a saved checkpoint.
    pub async fn resume(&mut self, checkpoint: Checkpoint) -> Result<CrawlJob> {
        info!(
            "Resuming crawl of {} from page {} ({} items already collected)",
            checkpoint.task.base_url,
            checkpoint.cursor,
            checkpoint.items.len()
        );
        let job = CrawlJob::from_checkpoint(checkpoint);
        let backend = self.setup_backend(&job).await?;
        self.run_with_backend(job, backend).await
    }

    /// Session creation failure aborts the whole job before any page is
    /// touched; an existing checkpoint stays on disk untouched.
    async fn setup_backend(&self, job: &CrawlJob) -> Result<Box<dyn FetchBackend>> {
        match create_backend(job.task.backend, &self.fetch).await {
            Ok(backend) => Ok(backend),
            Err(e) => {
                let mut failed = job.clone();
                failed.status = JobStatus::Failed;
                failed.last_error = Some(e.to_string());
                self.emit(JobEvent::Finished {
                    summary: failed.summary(),
                });
                Err(anyhow!("failed to set up {} backend: {}", job.task.backend, e))
            }
        }
    }

    async fn run_with_backend(
        &mut self,
        mut job: CrawlJob,
        mut backend: Box<dyn FetchBackend>,
    ) -> Result<CrawlJob> {
        job.status = JobStatus::Running;
        self.drive(&mut job, backend.as_mut()).await;

        // Teardown happens on every exit path before the summary is reported
        backend.close().await;

        match job.status {
            JobStatus::Completed => {
                if self.checkpoint_every.is_some() {
                    if let Err(e) = self.store.clear() {
                        warn!("Completed run could not clear its checkpoint: {}", e);
                    }
                }
            }
            JobStatus::Cancelled | JobStatus::Failed => {
                if self.checkpoint_every.is_some() {
                    match self.store.save(&job) {
                        Ok(()) => self.emit(JobEvent::CheckpointSaved { cursor: job.cursor }),
                        Err(e) => warn!("Could not save checkpoint on shutdown: {}", e),
                    }
                }
            }
            _ => {}
        }

        let summary = job.summary();
        info!("Job finished, {}", summary);
        self.emit(JobEvent::Finished { summary });
        Ok(job)
    }

    /// The page loop. Per-page failures are recorded and the loop moves on;
    /// only cancellation stops it early.
    async fn drive(&mut self, job: &mut CrawlJob, backend: &mut dyn FetchBackend) {
        let max = job.task.max_pages;
        let delay = Duration::from_millis(job.task.delay_ms);
        let mut pages_since_save = 0u32;

        for page in job.cursor..=max {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping before page {}", page);
                job.status = JobStatus::Cancelled;
                return;
            }

            job.cursor = page;
            if job.is_page_done(page) {
                debug!("Page {} already processed, skipping", page);
                continue;
            }

            let url = next_page_url(&job.task.base_url, page);
            self.emit(JobEvent::PageStarted {
                page,
                url: url.clone(),
            });

            let result = run_with_retry(
                &self.retry,
                &self.cancel,
                backend,
                // the future owns its URL so it only borrows the backend
                |b| {
                    let url = url.clone();
                    async move { b.fetch(&url).await }.boxed()
                },
                |attempt, e| {
                    warn!("Page {} attempt {} failed: {}", page, attempt, e);
                    self.emit(JobEvent::Retrying {
                        page,
                        attempt,
                        error: e.to_string(),
                    });
                },
            )
            .await;

            match result {
                Ok(fetched) => {
                    let items =
                        extract::extract(&fetched, page, job.task.profile, &job.task.fields);
                    if let Some(alerts) = self.alerts.as_mut() {
                        for item in &items {
                            alerts.observe(item);
                        }
                    }
                    let count = items.len();
                    job.record_completed(page, items);
                    info!("Page {}/{}: {} items", page, max, count);
                    self.emit(JobEvent::PageCompleted { page, items: count });
                }
                Err(RetryError::Cancelled) => {
                    info!("Cancellation requested while retrying page {}", page);
                    job.status = JobStatus::Cancelled;
                    return;
                }
                Err(e) => {
                    warn!("Page {} abandoned: {}", page, e);
                    job.record_failed(page, e.to_string());
                    self.emit(JobEvent::PageFailed {
                        page,
                        error: e.to_string(),
                    });
                }
            }

            pages_since_save += 1;
            if let Some(every) = self.checkpoint_every {
                if pages_since_save >= every {
                    pages_since_save = 0;
                    match self.store.save(job) {
                        Ok(()) => self.emit(JobEvent::CheckpointSaved { cursor: job.cursor }),
                        Err(e) => warn!("Checkpoint save failed, continuing: {}", e),
                    }
                }
            }

            if page < max && !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        job.status = JobStatus::Completed;
    }

    fn emit(&self, event: JobEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
