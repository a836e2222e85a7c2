use crate::downloader::registry::JobRegistry;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Removes Completed jobs from the registry after a fixed delay.
///
/// One timer per job, keyed by job id and cancellable if the user dismisses
/// the job first. Failed jobs are never scheduled here.
pub struct CleanupScheduler {
    registry: Arc<JobRegistry>,
    delay: Duration,
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl CleanupScheduler {
    pub fn new(registry: Arc<JobRegistry>, delay: Duration) -> Self {
        Self {
            registry,
            delay,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedules a one-shot removal timer for a job that just completed.
    pub async fn schedule(&self, job_id: String) {
        let registry = self.registry.clone();
        let timers = self.timers.clone();
        let delay = self.delay;
        let id = job_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Only removes the job if it is still Completed; the user may
            // have dismissed it already.
            if registry.remove_if_completed(&id).await {
                debug!("Cleaned up completed job {}", id);
            }
            timers.lock().await.remove(&id);
        });

        if let Some(previous) = self.timers.lock().await.insert(job_id, handle) {
            previous.abort();
        }
    }

    /// Cancels a pending timer, typically because the job was removed
    /// manually. Unknown ids are ignored.
    pub async fn cancel(&self, job_id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(job_id) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::MediaFormat;
    use std::path::PathBuf;

    async fn completed_job(registry: &JobRegistry) -> String {
        let id = registry
            .submit(
                "https://a.example/1".into(),
                PathBuf::from("/tmp"),
                MediaFormat::Audio,
            )
            .await;
        registry.mark_in_progress(&id).await;
        registry.mark_completed(&id, None).await;
        id
    }

    #[tokio::test(start_paused = true)]
    async fn removes_completed_job_after_delay() {
        let registry = Arc::new(JobRegistry::new());
        let scheduler = CleanupScheduler::new(registry.clone(), Duration::from_secs(10));
        let id = completed_job(&registry).await;

        scheduler.schedule(id.clone()).await;
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(registry.snapshot().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_removal_before_timer_is_safe() {
        let registry = Arc::new(JobRegistry::new());
        let scheduler = CleanupScheduler::new(registry.clone(), Duration::from_secs(10));
        let id = completed_job(&registry).await;

        scheduler.schedule(id.clone()).await;
        assert!(registry.remove_finished(&id).await.unwrap());
        scheduler.cancel(&id).await;

        // Firing window passes without incident
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_one_timer_leaves_others_intact() {
        let registry = Arc::new(JobRegistry::new());
        let scheduler = CleanupScheduler::new(registry.clone(), Duration::from_secs(10));
        let a = completed_job(&registry).await;
        let b = completed_job(&registry).await;

        scheduler.schedule(a.clone()).await;
        scheduler.schedule(b.clone()).await;
        scheduler.cancel(&a).await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        let jobs = registry.snapshot().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, a);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_jobs_are_never_auto_removed() {
        let registry = Arc::new(JobRegistry::new());
        let scheduler = CleanupScheduler::new(registry.clone(), Duration::from_secs(10));
        let id = registry
            .submit(
                "https://a.example/1".into(),
                PathBuf::from("/tmp"),
                MediaFormat::Audio,
            )
            .await;
        registry.mark_in_progress(&id).await;
        registry.mark_failed(&id, "network down".into()).await;

        // Even a stray schedule for a failed job must not remove it.
        scheduler.schedule(id.clone()).await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.snapshot().await.len(), 1);
    }
}
