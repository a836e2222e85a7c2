use crate::downloader::{Job, JobState, MediaFormat};
use crate::errors::{AppError, Result};
use crate::utils::generate_job_id;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

pub type RefreshHook = Arc<dyn Fn(&[Job]) + Send + Sync>;

/// Insertion-ordered collection of jobs, the single source of truth for what
/// is displayed. All mutation goes through these synchronized operations;
/// readers only ever get cloned snapshots.
///
/// Mutations referencing an absent id are benign no-ops: the job may have
/// been removed concurrently by cleanup or by the user.
pub struct JobRegistry {
    jobs: Mutex<Vec<Job>>,
    refresh_hook: RwLock<Option<RefreshHook>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            refresh_hook: RwLock::new(None),
        }
    }

    /// Registers the hook invoked after every mutation. The hook runs inside
    /// the registry's critical section, so deliveries arrive in mutation
    /// order; it must not block for long.
    pub fn set_refresh_hook(&self, hook: RefreshHook) {
        *self.refresh_hook.write().expect("refresh hook lock poisoned") = Some(hook);
    }

    fn fire_refresh(&self, snapshot: &[Job]) {
        if let Some(hook) = self
            .refresh_hook
            .read()
            .expect("refresh hook lock poisoned")
            .as_ref()
        {
            hook(snapshot);
        }
    }

    /// Creates a Pending job and appends it to the registry.
    pub async fn submit(&self, url: String, output_target: PathBuf, format: MediaFormat) -> String {
        let job = Job::new(generate_job_id(), url, output_target, format);
        let id = job.id.clone();
        let mut jobs = self.jobs.lock().await;
        jobs.push(job);
        self.fire_refresh(&jobs);
        id
    }

    pub async fn mark_in_progress(&self, id: &str) {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if job.state == JobState::Pending => {
                job.state = JobState::InProgress;
                job.started_at = Some(chrono::Utc::now());
            }
            _ => return,
        }
        self.fire_refresh(&jobs);
    }

    /// Applies a progress update. Updates are clamped to [0, 100], only
    /// applied while the job is InProgress, and never decrease.
    pub async fn update_progress(&self, id: &str, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if job.state == JobState::InProgress && percent > job.progress_percent => {
                job.progress_percent = percent;
            }
            _ => return,
        }
        self.fire_refresh(&jobs);
    }

    /// Records the resolved title; metadata may arrive before completion.
    pub async fn set_title(&self, id: &str, title: String) {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => job.display_title = Some(title),
            None => return,
        }
        self.fire_refresh(&jobs);
    }

    /// Transitions a job to Completed. Returns true only when the transition
    /// actually happened, so completion side effects run exactly once.
    pub async fn mark_completed(&self, id: &str, title: Option<String>) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if job.state == JobState::InProgress => {
                job.state = JobState::Completed;
                job.progress_percent = 100.0;
                job.completed_at = Some(chrono::Utc::now());
                if title.is_some() {
                    job.display_title = title;
                }
            }
            _ => return false,
        }
        self.fire_refresh(&jobs);
        true
    }

    /// Transitions a job to Failed, storing a human-readable reason.
    pub async fn mark_failed(&self, id: &str, reason: String) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if !job.is_terminal() => {
                job.state = JobState::Failed;
                job.error_detail = Some(reason);
                job.completed_at = Some(chrono::Utc::now());
            }
            _ => return false,
        }
        self.fire_refresh(&jobs);
        true
    }

    /// Removes a job regardless of state. Returns true when something was
    /// removed; double removal is a no-op.
    pub async fn remove(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return false;
        }
        self.fire_refresh(&jobs);
        true
    }

    /// Cleanup path: removes the job only if it is still Completed. The user
    /// may have removed it manually in the meantime.
    pub async fn remove_if_completed(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id || j.state != JobState::Completed);
        if jobs.len() == before {
            return false;
        }
        self.fire_refresh(&jobs);
        true
    }

    /// Manual removal path: only terminal jobs may be dismissed. Removing an
    /// in-flight job is unsupported, and an absent id is a no-op.
    pub async fn remove_finished(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter().find(|j| j.id == id) {
            Some(job) if !job.is_terminal() => {
                return Err(AppError::InvalidInput(format!(
                    "Job {} is still {:?} and cannot be removed",
                    id, job.state
                )));
            }
            Some(_) => {}
            None => return Ok(false),
        }
        jobs.retain(|j| j.id != id);
        self.fire_refresh(&jobs);
        Ok(true)
    }

    /// Returns an immutable copy of the registry in insertion order.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }

    /// Re-fires the refresh hook with the current snapshot.
    pub async fn notify_refresh(&self) {
        let jobs = self.jobs.lock().await;
        self.fire_refresh(&jobs);
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn target() -> PathBuf {
        PathBuf::from("/tmp/downloads")
    }

    #[tokio::test]
    async fn submit_creates_pending_job_in_order() {
        let registry = JobRegistry::new();
        let a = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;
        let b = registry
            .submit("https://a.example/2".into(), target(), MediaFormat::Video)
            .await;

        let jobs = registry.snapshot().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, a);
        assert_eq!(jobs[1].id, b);
        assert!(jobs.iter().all(|j| j.state == JobState::Pending));
        assert!(jobs.iter().all(|j| j.progress_percent == 0.0));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_clamped() {
        let registry = JobRegistry::new();
        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;

        // Ignored while Pending
        registry.update_progress(&id, 50.0).await;
        assert_eq!(registry.snapshot().await[0].progress_percent, 0.0);

        registry.mark_in_progress(&id).await;
        registry.update_progress(&id, 40.0).await;
        registry.update_progress(&id, 30.0).await; // never decreases
        assert_eq!(registry.snapshot().await[0].progress_percent, 40.0);

        registry.update_progress(&id, 250.0).await;
        assert_eq!(registry.snapshot().await[0].progress_percent, 100.0);
    }

    #[tokio::test]
    async fn completion_is_terminal_and_sets_progress() {
        let registry = JobRegistry::new();
        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;
        registry.mark_in_progress(&id).await;

        assert!(registry.mark_completed(&id, Some("Song".into())).await);
        // Second transition is rejected
        assert!(!registry.mark_completed(&id, None).await);
        assert!(!registry.mark_failed(&id, "late".into()).await);

        let job = &registry.snapshot().await[0];
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress_percent, 100.0);
        assert_eq!(job.display_title.as_deref(), Some("Song"));
    }

    #[tokio::test]
    async fn completion_keeps_earlier_title_when_none_given() {
        let registry = JobRegistry::new();
        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;
        registry.mark_in_progress(&id).await;
        registry.set_title(&id, "Early Title".into()).await;
        registry.mark_completed(&id, None).await;

        let job = &registry.snapshot().await[0];
        assert_eq!(job.display_title.as_deref(), Some("Early Title"));
    }

    #[tokio::test]
    async fn operations_on_absent_id_are_noops() {
        let registry = JobRegistry::new();
        registry.mark_in_progress("nope").await;
        registry.update_progress("nope", 50.0).await;
        registry.set_title("nope", "t".into()).await;
        assert!(!registry.mark_completed("nope", None).await);
        assert!(!registry.mark_failed("nope", "r".into()).await);
        assert!(!registry.remove("nope").await);
        assert!(matches!(registry.remove_finished("nope").await, Ok(false)));
    }

    #[tokio::test]
    async fn manual_removal_rejects_non_terminal_jobs() {
        let registry = JobRegistry::new();
        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;

        assert!(registry.remove_finished(&id).await.is_err());
        registry.mark_in_progress(&id).await;
        assert!(registry.remove_finished(&id).await.is_err());
        assert_eq!(registry.snapshot().await.len(), 1);

        registry.mark_failed(&id, "boom".into()).await;
        assert!(matches!(registry.remove_finished(&id).await, Ok(true)));
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn cleanup_removal_skips_jobs_no_longer_completed() {
        let registry = JobRegistry::new();
        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;
        registry.mark_in_progress(&id).await;
        assert!(!registry.remove_if_completed(&id).await);

        registry.mark_completed(&id, None).await;
        assert!(registry.remove_if_completed(&id).await);
        // Idempotent
        assert!(!registry.remove_if_completed(&id).await);
    }

    #[tokio::test]
    async fn refresh_hook_fires_after_each_mutation() {
        let registry = JobRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.set_refresh_hook(Arc::new(move |_jobs| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;
        registry.mark_in_progress(&id).await;
        registry.update_progress(&id, 10.0).await;
        registry.mark_completed(&id, None).await;
        registry.remove(&id).await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        // No-op mutations do not fire the hook
        registry.update_progress(&id, 50.0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refresh_hook_deliveries_arrive_in_mutation_order() {
        let registry = Arc::new(JobRegistry::new());
        let seen: Arc<std::sync::Mutex<Vec<f32>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.set_refresh_hook(Arc::new(move |jobs| {
            if let Some(job) = jobs.first() {
                sink.lock().unwrap().push(job.progress_percent);
            }
        }));

        let id = registry
            .submit("https://a.example/1".into(), target(), MediaFormat::Audio)
            .await;
        registry.mark_in_progress(&id).await;

        let mut handles = Vec::new();
        for step in 1..=200u32 {
            let registry = registry.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                registry.update_progress(&id, step as f32 / 2.0).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Progress never decreases, so snapshots observed in delivery order
        // must be non-decreasing. An out-of-order delivery would show a
        // higher percentage followed by a lower one.
        let seen = seen.lock().unwrap();
        assert!(
            seen.windows(2).all(|w| w[0] <= w[1]),
            "hook observed stale snapshot after newer one: {:?}",
            *seen
        );
    }
}
