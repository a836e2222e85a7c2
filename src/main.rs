mod config;
mod downloader;
mod errors;
mod fetcher;
mod notify;
mod transcode;
mod utils;

use clap::Parser;
use downloader::manager::DownloadManager;
use downloader::{Job, JobState, MediaFormat, SubmitRequest};
use errors::{AppError, Result};
use log::{error, info, warn};
use notify::{LogNotifier, Notifier, NullNotifier};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use transcode::FfmpegTranscoder;

#[derive(Parser, Debug)]
#[command(
    name = "xpedian",
    version,
    about = "Concurrent media downloader with playlist support"
)]
struct Cli {
    /// Media or playlist URLs to download
    urls: Vec<String>,

    /// Output format: audio (mp3) or video (mp4)
    #[arg(long)]
    format: Option<String>,

    /// Output directory (defaults to the configured download path)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Read additional URLs from a text file, one per line
    #[arg(long)]
    from_file: Option<PathBuf>,

    /// Maximum number of simultaneous downloads
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match config::AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            config::AppConfig::default()
        }
    };

    let format = match &cli.format {
        Some(s) => s.parse()?,
        None => config.preferred_format,
    };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| config.download_path.clone());
    utils::ensure_dir_exists(&output).await?;

    let requests = collect_requests(&cli, &output, format).await?;
    if requests.is_empty() {
        return Err(AppError::InvalidInput(
            "No URLs to download; pass them as arguments or via --from-file".to_string(),
        ));
    }

    let transcoder = Arc::new(FfmpegTranscoder::new());
    if format == MediaFormat::Audio && !transcoder.is_available().await {
        warn!("ffmpeg not found on PATH; audio conversion will fail");
    }
    let notifier: Arc<dyn Notifier> = if config.show_notifications {
        Arc::new(LogNotifier)
    } else {
        Arc::new(NullNotifier)
    };

    let manager = DownloadManager::new(
        cli.concurrency.unwrap_or(config.max_concurrent_downloads),
        Duration::from_secs(config.cleanup_delay_secs),
        config.audio_bitrate_kbps,
        Arc::new(fetcher::ytdlp::YtDlpFetcher::new()),
        transcoder,
        notifier,
    );
    manager.set_refresh_hook(Arc::new(|jobs| {
        log::debug!("Queue updated: {} job(s)", jobs.len());
    }));

    let ids = manager.submit_many(requests).await?;
    info!("Submitted {} download(s)", ids.len());

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    loop {
        ticker.tick().await;
        let jobs = manager.snapshot().await;
        render_active(&jobs);
        if jobs.iter().all(|job| job.is_terminal()) {
            break;
        }
    }

    let failed: Vec<Job> = manager
        .snapshot()
        .await
        .into_iter()
        .filter(|job| job.state == JobState::Failed)
        .collect();
    for job in &failed {
        error!(
            "Failed: {} ({})",
            job.display_title.as_deref().unwrap_or(&job.source_url),
            job.error_detail.as_deref().unwrap_or("unknown error")
        );
    }

    manager.shutdown().await;

    if failed.is_empty() {
        Ok(())
    } else {
        Err(AppError::Download(format!(
            "{} download(s) failed",
            failed.len()
        )))
    }
}

/// Gathers submission requests from the command line and, optionally, a URL
/// list file. File lines are validated independently: bad lines are reported
/// and skipped, good ones are accepted.
async fn collect_requests(
    cli: &Cli,
    output: &std::path::Path,
    format: MediaFormat,
) -> Result<Vec<SubmitRequest>> {
    let mut requests: Vec<SubmitRequest> = cli
        .urls
        .iter()
        .map(|url| SubmitRequest {
            url: url.clone(),
            output_target: output.to_path_buf(),
            format,
        })
        .collect();

    if let Some(file) = &cli.from_file {
        let content = tokio::fs::read_to_string(file).await?;
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match url::Url::parse(line) {
                Ok(_) => requests.push(SubmitRequest {
                    url: line.to_string(),
                    output_target: output.to_path_buf(),
                    format,
                }),
                Err(e) => warn!("Skipping line {} of {:?}: {}", line_no + 1, file, e),
            }
        }
    }

    Ok(requests)
}

fn render_active(jobs: &[Job]) {
    for job in jobs {
        if job.state == JobState::InProgress {
            info!(
                "[{:>5.1}%] {}",
                job.progress_percent,
                job.display_title.as_deref().unwrap_or(&job.source_url)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(urls: &[&str], from_file: Option<PathBuf>) -> Cli {
        Cli {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            format: None,
            output: Some(PathBuf::from("/tmp/out")),
            from_file,
            concurrency: None,
        }
    }

    #[tokio::test]
    async fn collect_requests_combines_arguments_and_list_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# favourites").unwrap();
        writeln!(file, "https://media.example/watch?v=b").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not a url at all").unwrap();
        writeln!(file, "  https://media.example/watch?v=c  ").unwrap();

        let cli = cli(
            &["https://media.example/watch?v=a"],
            Some(file.path().to_path_buf()),
        );
        let output = cli.output.clone().unwrap();
        let requests = collect_requests(&cli, &output, MediaFormat::Audio)
            .await
            .unwrap();

        // Bad lines are skipped independently; good ones are accepted
        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://media.example/watch?v=a",
                "https://media.example/watch?v=b",
                "https://media.example/watch?v=c",
            ]
        );
        assert!(requests
            .iter()
            .all(|r| r.output_target == PathBuf::from("/tmp/out")));
    }

    #[tokio::test]
    async fn collect_requests_with_no_sources_is_empty() {
        let cli = cli(&[], None);
        let output = cli.output.clone().unwrap();
        let requests = collect_requests(&cli, &output, MediaFormat::Video)
            .await
            .unwrap();
        assert!(requests.is_empty());
    }
}
