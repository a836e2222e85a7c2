use crate::downloader::registry::JobRegistry;
use crate::notify::Notifier;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Counters {
    total_submitted: usize,
    completed_count: usize,
    notified: bool,
}

/// Tracks total vs. completed jobs for the current submission batch and
/// fires the "all downloads complete" notification exactly once per batch.
///
/// The increment and the equality check happen inside one critical section,
/// so concurrent completions can neither double-fire nor under-fire.
pub struct BatchTracker {
    counters: Mutex<Counters>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<JobRegistry>,
}

impl BatchTracker {
    pub fn new(notifier: Arc<dyn Notifier>, registry: Arc<JobRegistry>) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            notifier,
            registry,
        }
    }

    /// Resets the counters at the start of a user-initiated submission.
    pub async fn begin_batch(&self) {
        let mut counters = self.counters.lock().await;
        *counters = Counters::default();
    }

    /// Records jobs actually accepted into the registry, after expansion.
    pub async fn add_submitted(&self, count: usize) {
        let mut counters = self.counters.lock().await;
        counters.total_submitted += count;
    }

    /// Records one job reaching Completed. Failed jobs never count.
    pub async fn job_completed(&self) {
        let fire = {
            let mut counters = self.counters.lock().await;
            counters.completed_count += 1;
            if counters.total_submitted > 0
                && counters.completed_count == counters.total_submitted
                && !counters.notified
            {
                counters.notified = true;
                Some(counters.total_submitted)
            } else {
                None
            }
        };

        if let Some(total) = fire {
            self.notifier.notify(
                "Downloads complete",
                &format!("All {} download(s) finished", total),
            );
            self.registry.notify_refresh().await;
        }
    }

    /// True once the current batch has fired its completion signal.
    pub async fn is_complete(&self) -> bool {
        self.counters.lock().await.notified
    }
}
