use crate::downloader::batch::BatchTracker;
use crate::downloader::cleanup::CleanupScheduler;
use crate::downloader::registry::JobRegistry;
use crate::downloader::MediaFormat;
use crate::fetcher::{FetchEvent, MediaFetcher};
use crate::transcode::Transcoder;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One dispatched unit of work, already expanded and registered.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: String,
    pub url: String,
    pub output_target: PathBuf,
    pub format: MediaFormat,
}

struct WorkerContext {
    registry: Arc<JobRegistry>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    batch: Arc<BatchTracker>,
    cleanup: Arc<CleanupScheduler>,
    audio_bitrate_kbps: u32,
}

/// Fixed-size pool of worker tasks pulling from one FIFO queue.
///
/// Submission never blocks; the queue is unbounded and work is dispatched
/// first-submitted-first-dispatched with no priority between formats.
pub struct WorkerPool {
    queue: UnboundedSender<WorkItem>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        size: usize,
        registry: Arc<JobRegistry>,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
        batch: Arc<BatchTracker>,
        cleanup: Arc<CleanupScheduler>,
        audio_bitrate_kbps: u32,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let ctx = Arc::new(WorkerContext {
            registry,
            fetcher,
            transcoder,
            batch,
            cleanup,
            audio_bitrate_kbps,
        });

        let workers = (0..size.max(1))
            .map(|index| {
                let rx = rx.clone();
                let ctx = ctx.clone();
                tokio::spawn(worker_loop(index, rx, ctx))
            })
            .collect();

        Self { queue, workers }
    }

    /// Hands a job to the pool. Never blocks the submitter.
    pub fn enqueue(&self, item: WorkItem) {
        if self.queue.send(item).is_err() {
            error!("Worker pool queue is closed; job dropped");
        }
    }

    /// Closes the queue and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        drop(self.queue);
        futures::future::join_all(self.workers).await;
    }
}

async fn worker_loop(
    index: usize,
    rx: Arc<Mutex<UnboundedReceiver<WorkItem>>>,
    ctx: Arc<WorkerContext>,
) {
    debug!("Worker {} started", index);
    loop {
        // Lock only to receive, so exactly one worker claims each item.
        let item = rx.lock().await.recv().await;
        match item {
            Some(item) => run_job(&ctx, item).await,
            None => break,
        }
    }
    debug!("Worker {} stopped", index);
}

async fn run_job(ctx: &WorkerContext, item: WorkItem) {
    info!("Starting download {} ({})", item.job_id, item.url);
    ctx.registry.mark_in_progress(&item.job_id).await;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let registry = ctx.registry.clone();
    let job_id = item.job_id.clone();

    // Single consumer per job: events are applied in the order the fetcher
    // emits them.
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                FetchEvent::Progress {
                    downloaded_bytes,
                    total_bytes,
                } => {
                    if let Some(total) = total_bytes.filter(|t| *t > 0) {
                        let percent = (downloaded_bytes as f64 / total as f64 * 100.0) as f32;
                        registry.update_progress(&job_id, percent).await;
                    }
                }
                FetchEvent::Title(title) => registry.set_title(&job_id, title).await,
            }
        }
    });

    let fetched = ctx
        .fetcher
        .fetch(&item.url, &item.output_target, item.format, events_tx)
        .await;

    // The fetcher has dropped its sender; drain remaining events so no
    // progress update lands after the terminal transition.
    let _ = forwarder.await;

    let outcome = match fetched {
        Ok(asset) => finish_asset(ctx, &item, asset).await,
        Err(e) => Err(format!("Download failed: {}", e)),
    };

    match outcome {
        Ok(final_path) => {
            if ctx.registry.mark_completed(&item.job_id, None).await {
                info!("Completed download {} -> {:?}", item.job_id, final_path);
                ctx.cleanup.schedule(item.job_id.clone()).await;
                ctx.batch.job_completed().await;
            }
        }
        Err(reason) => {
            error!("Job {} failed: {}", item.job_id, reason);
            ctx.registry.mark_failed(&item.job_id, reason).await;
        }
    }
}

/// Runs the optional transcode step. The fetched intermediate is removed on
/// success and on transcode failure alike.
async fn finish_asset(
    ctx: &WorkerContext,
    item: &WorkItem,
    asset: PathBuf,
) -> std::result::Result<PathBuf, String> {
    let already_target =
        asset.extension().and_then(|e| e.to_str()) == Some(item.format.extension());
    if item.format != MediaFormat::Audio || already_target {
        return Ok(asset);
    }

    match ctx
        .transcoder
        .transcode(&asset, MediaFormat::Audio, ctx.audio_bitrate_kbps)
        .await
    {
        Ok(output) => {
            remove_intermediate(&asset).await;
            Ok(output)
        }
        Err(e) => {
            remove_intermediate(&asset).await;
            Err(format!("Transcode failed: {}", e))
        }
    }
}

async fn remove_intermediate(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not remove intermediate {:?}: {}", path, e);
    }
}
