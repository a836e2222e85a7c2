use crate::downloader::batch::BatchTracker;
use crate::downloader::cleanup::CleanupScheduler;
use crate::downloader::expander::PlaylistExpander;
use crate::downloader::pool::{WorkItem, WorkerPool};
use crate::downloader::registry::{JobRegistry, RefreshHook};
use crate::downloader::{Job, SubmitRequest};
use crate::errors::{AppError, Result};
use crate::fetcher::MediaFetcher;
use crate::notify::Notifier;
use crate::transcode::Transcoder;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The orchestration engine: validates submissions, expands collections,
/// registers jobs and hands them to the worker pool.
pub struct DownloadManager {
    registry: Arc<JobRegistry>,
    pool: WorkerPool,
    expander: PlaylistExpander,
    batch: Arc<BatchTracker>,
    cleanup: Arc<CleanupScheduler>,
}

impl DownloadManager {
    pub fn new(
        max_concurrent: usize,
        cleanup_delay: Duration,
        audio_bitrate_kbps: u32,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let batch = Arc::new(BatchTracker::new(notifier, registry.clone()));
        let cleanup = Arc::new(CleanupScheduler::new(registry.clone(), cleanup_delay));
        let pool = WorkerPool::new(
            max_concurrent,
            registry.clone(),
            fetcher.clone(),
            transcoder,
            batch.clone(),
            cleanup.clone(),
            audio_bitrate_kbps,
        );

        Self {
            registry,
            pool,
            expander: PlaylistExpander::new(fetcher),
            batch,
            cleanup,
        }
    }

    pub fn set_refresh_hook(&self, hook: RefreshHook) {
        self.registry.set_refresh_hook(hook);
    }

    /// Submits one user request as its own batch.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Vec<String>> {
        self.submit_many(vec![request]).await
    }

    /// Submits a set of requests as one batch (one user action).
    ///
    /// Validation and expansion happen before any job is created, so a
    /// rejected URL or a failed enumeration produces zero registry entries.
    /// Returns the ids of all accepted jobs.
    pub async fn submit_many(&self, requests: Vec<SubmitRequest>) -> Result<Vec<String>> {
        if requests.is_empty() {
            return Err(AppError::InvalidInput("Nothing to submit".to_string()));
        }
        for request in &requests {
            validate_url(&request.url)?;
        }

        // Expand everything up front: all-or-nothing, no phantom jobs.
        let mut expanded = Vec::new();
        for request in requests {
            for child_url in self.expander.expand(&request.url).await? {
                expanded.push(SubmitRequest {
                    url: child_url,
                    output_target: request.output_target.clone(),
                    format: request.format,
                });
            }
        }

        self.batch.begin_batch().await;
        self.batch.add_submitted(expanded.len()).await;

        let mut ids = Vec::with_capacity(expanded.len());
        for request in expanded {
            let id = self
                .registry
                .submit(
                    request.url.clone(),
                    request.output_target.clone(),
                    request.format,
                )
                .await;
            self.pool.enqueue(WorkItem {
                job_id: id.clone(),
                url: request.url,
                output_target: request.output_target,
                format: request.format,
            });
            ids.push(id);
        }

        info!("Accepted {} job(s) for download", ids.len());
        Ok(ids)
    }

    /// Manual removal of a finished job. Cancels any pending cleanup timer.
    /// Rejects jobs that are still Pending or InProgress; an in-flight fetch
    /// cannot be interrupted.
    pub async fn remove_finished(&self, job_id: &str) -> Result<()> {
        if self.registry.remove_finished(job_id).await? {
            self.cleanup.cancel(job_id).await;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<Job> {
        self.registry.snapshot().await
    }

    /// True once every job of the current batch has completed.
    pub async fn batch_complete(&self) -> bool {
        self.batch.is_complete().await
    }

    /// True while any job is still Pending or InProgress.
    pub async fn has_active_jobs(&self) -> bool {
        self.registry
            .snapshot()
            .await
            .iter()
            .any(|job| !job.is_terminal())
    }

    /// Stops accepting work and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(AppError::InvalidInput("URL cannot be empty".to_string()));
    }

    let parsed =
        Url::parse(url).map_err(|e| AppError::InvalidInput(format!("Invalid URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::InvalidInput(format!(
            "Unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(AppError::InvalidInput("URL must have a host".to_string()));
    }

    Ok(())
}
